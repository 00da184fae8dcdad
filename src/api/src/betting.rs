//! Betting logic: implied probability, value score, Kelly sizing, value-bet selection.
//!
//! Odds are decimal (Hong Kong style): a winning 1-unit stake at odds 4.5
//! returns 4.5 units including the stake.

use serde::{Deserialize, Serialize};

use crate::config::BettingConfig;

/// Probability implied by the market odds.
pub fn implied_probability(odds: f64) -> f64 {
    if odds <= 0.0 {
        return 0.0;
    }
    1.0 / odds
}

/// Rough win probability from a top-3 probability.
pub fn estimated_win_probability(top3_prob: f64, divisor: f64) -> f64 {
    (top3_prob / divisor).min(0.99)
}

/// Capped Kelly fraction for a win bet.
///
/// Kelly fraction = (b * w - q) / b
/// where:
///   w = estimated win probability (top-3 probability / divisor)
///   b = net odds (odds - 1)
///   q = 1 - w
///
/// # Returns
/// Fraction of bankroll to stake, in `[0, kelly_cap]`
pub fn kelly_fraction(top3_prob: f64, odds: f64, config: &BettingConfig) -> f64 {
    if odds <= 1.0 || top3_prob <= 0.0 {
        return 0.0;
    }

    let w = estimated_win_probability(top3_prob, config.win_prob_divisor);
    let b = odds - 1.0;
    let q = 1.0 - w;

    let kelly = (b * w - q) / b;
    kelly.clamp(0.0, config.kelly_cap)
}

/// Model probability minus market-implied probability.
pub fn value_score(top3_prob: f64, odds: f64) -> f64 {
    top3_prob - implied_probability(odds)
}

/// Edge against the raw odds (`p - 1/odds`).
pub fn edge(prob: f64, odds: f64) -> f64 {
    prob - 1.0 / odds
}

/// Expected profit of a 1-unit bet paying `odds` when it lands.
pub fn expected_profit(prob: f64, odds: f64) -> f64 {
    prob * (odds - 1.0) - (1.0 - prob)
}

/// Round to 4 decimal places.
pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Recommendation tier derived from the value score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTier {
    Strong,
    Moderate,
    None,
}

impl ValueTier {
    pub fn from_score(score: f64, config: &BettingConfig) -> Self {
        if score > config.strong_value {
            ValueTier::Strong
        } else if score > config.moderate_value {
            ValueTier::Moderate
        } else {
            ValueTier::None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValueTier::Strong => "strong bet",
            ValueTier::Moderate => "worth considering",
            ValueTier::None => "no significant value",
        }
    }
}

/// Confidence bucket for a single-horse prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_probability(prob: f64) -> Self {
        let pct = prob * 100.0;
        if pct >= 70.0 {
            ConfidenceLevel::High
        } else if pct >= 40.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// A saved prediction considered for a value bet.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedRunner {
    pub horse_name: String,
    pub win_odds: Option<f64>,
    pub predicted_top3_prob: Option<f64>,
}

/// A runner whose edge clears the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueBet {
    /// Position of the runner in the input
    #[serde(skip)]
    pub index: usize,
    pub horse_name: String,
    pub win_odds: f64,
    pub predicted_top3_prob: f64,
    pub edge: f64,
    pub expected_return: f64,
}

/// Find value bets where edge > threshold.
///
/// Runners without usable odds or probability are skipped. Output keeps input
/// order, values rounded to 4 decimals.
pub fn find_value_bets(runners: &[PredictedRunner], threshold: f64) -> Vec<ValueBet> {
    runners
        .iter()
        .enumerate()
        .filter_map(|(index, r)| {
            let odds = r.win_odds.filter(|o| o.is_finite() && *o != 0.0)?;
            let prob = r.predicted_top3_prob.filter(|p| p.is_finite())?;
            let e = edge(prob, odds);
            (e > threshold).then(|| ValueBet {
                index,
                horse_name: r.horse_name.clone(),
                win_odds: odds,
                predicted_top3_prob: round4(prob),
                edge: round4(e),
                expected_return: round4(e * odds),
            })
        })
        .collect()
}
