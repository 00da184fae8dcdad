//! Race entries to per-horse predictions.

use ndarray::Array2;
use thiserror::Error;

use crate::betting::{self, round4};
use crate::config::BettingConfig;
use crate::encoder::{encode, LabelEncoder};
use crate::model::{Top3Model, NUM_FEATURES};
use crate::race_card::RaceEntry;
use crate::types::PredictionRow;

/// Value used for any missing model input.
pub const MISSING_VALUE: f32 = -1.0;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model not loaded, cannot predict")]
    ModelNotLoaded,

    #[error("model prediction failed: {0}")]
    Inference(String),
}

/// Jockey and trainer encoders used to build model inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoders<'a> {
    pub jockey: Option<&'a LabelEncoder>,
    pub trainer: Option<&'a LabelEncoder>,
}

/// Feature row in model order: actual_weight, draw, win_odds, jockey, trainer.
pub fn feature_row(entry: &RaceEntry, encoders: Encoders<'_>) -> [f32; NUM_FEATURES] {
    let num = |v: Option<f64>| v.map_or(MISSING_VALUE, |x| x as f32);
    [
        num(entry.actual_weight),
        num(entry.draw),
        num(entry.win_odds),
        encode(encoders.jockey, &entry.jockey) as f32,
        encode(encoders.trainer, &entry.trainer) as f32,
    ]
}

/// Build the `(n_horses, NUM_FEATURES)` input matrix.
pub fn build_features(entries: &[RaceEntry], encoders: Encoders<'_>) -> Array2<f32> {
    let mut features = Array2::<f32>::zeros((entries.len(), NUM_FEATURES));
    for (i, entry) in entries.iter().enumerate() {
        for (j, value) in feature_row(entry, encoders).into_iter().enumerate() {
            features[[i, j]] = value;
        }
    }
    features
}

/// Run the model over a race card and attach value metrics, in input order.
pub fn predict_entries(
    entries: &[RaceEntry],
    model: Option<&dyn Top3Model>,
    encoders: Encoders<'_>,
    config: &BettingConfig,
) -> Result<Vec<PredictionRow>, PredictError> {
    let model = model.ok_or(PredictError::ModelNotLoaded)?;
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let probs = model
        .predict_proba(build_features(entries, encoders))
        .map_err(|e| PredictError::Inference(e.to_string()))?;

    if probs.len() != entries.len() {
        return Err(PredictError::Inference(format!(
            "expected {} probabilities, got {}",
            entries.len(),
            probs.len()
        )));
    }

    let rows = entries
        .iter()
        .zip(probs)
        .map(|(entry, prob)| {
            let odds = entry.win_odds.unwrap_or(MISSING_VALUE as f64);
            PredictionRow {
                horse_name: entry.horse_name.clone(),
                jockey: entry.jockey.clone(),
                trainer: entry.trainer.clone(),
                win_odds: odds,
                predicted_top3_prob: round4(prob),
                implied_probability: round4(betting::implied_probability(odds)),
                value_score: round4(betting::value_score(prob, odds)),
                kelly_fraction: round4(betting::kelly_fraction(prob, odds, config)),
            }
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriorModel;

    fn entry(name: &str, jockey: &str, odds: Option<f64>) -> RaceEntry {
        RaceEntry {
            horse_name: name.to_string(),
            jockey: jockey.to_string(),
            trainer: "沈集成".to_string(),
            actual_weight: Some(126.0),
            draw: None,
            win_odds: odds,
        }
    }

    struct FailingModel;

    impl Top3Model for FailingModel {
        fn predict_proba(&self, _features: Array2<f32>) -> anyhow::Result<Vec<f64>> {
            anyhow::bail!("bad input")
        }

        fn kind(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_feature_row_fills_missing_and_unknown() {
        let jockeys = LabelEncoder::fit(["潘頓", "莫雷拉"]);
        let encoders = Encoders {
            jockey: Some(&jockeys),
            trainer: None,
        };
        let row = feature_row(&entry("A", "莫雷拉", Some(3.5)), encoders);
        assert_eq!(row, [126.0, -1.0, 3.5, 1.0, -1.0]);
    }

    #[test]
    fn test_build_features_shape() {
        let entries = vec![entry("A", "x", Some(2.0)), entry("B", "y", None)];
        let features = build_features(&entries, Encoders::default());
        assert_eq!(features.shape(), &[2, NUM_FEATURES]);
        assert_eq!(features[[1, 2]], -1.0);
    }

    #[test]
    fn test_predict_entries_metrics() {
        let model = PriorModel::new(0.75);
        let entries = vec![entry("A", "x", Some(4.0)), entry("B", "y", None)];
        let rows = predict_entries(
            &entries,
            Some(&model as &dyn Top3Model),
            Encoders::default(),
            &BettingConfig::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].horse_name, "A");
        assert_eq!(rows[0].predicted_top3_prob, 0.75);
        assert_eq!(rows[0].implied_probability, 0.25);
        assert_eq!(rows[0].value_score, 0.5);
        // w = 0.25, b = 3, kelly = (0.75 - 0.75) / 3 = 0
        assert_eq!(rows[0].kelly_fraction, 0.0);

        assert_eq!(rows[1].win_odds, -1.0);
        assert_eq!(rows[1].implied_probability, 0.0);
        assert_eq!(rows[1].kelly_fraction, 0.0);
    }

    #[test]
    fn test_model_not_loaded() {
        let result = predict_entries(
            &[entry("A", "x", Some(2.0))],
            None,
            Encoders::default(),
            &BettingConfig::default(),
        );
        assert!(matches!(result, Err(PredictError::ModelNotLoaded)));
    }

    #[test]
    fn test_inference_failure() {
        let result = predict_entries(
            &[entry("A", "x", Some(2.0))],
            Some(&FailingModel as &dyn Top3Model),
            Encoders::default(),
            &BettingConfig::default(),
        );
        match result {
            Err(PredictError::Inference(msg)) => assert!(msg.contains("bad input")),
            other => panic!("Expected Inference error, got {:?}", other),
        }
    }
}
