//! Synthetic race history for exercising the feature, selection and backtest pipelines.
//!
//! Outcomes come from a hand-tuned strength score: strong jockeys and
//! trainers, inside draws, good going, prime age and short odds all raise the
//! chance of a top-3 finish.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use polars::prelude::{Column, DataFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::encoder::LabelEncoder;

pub const JOCKEYS: [&str; 9] = [
    "莫雷拉", "潘頓", "田泰安", "蔡明紹", "何澤堯", "布文", "艾道拿", "周俊樂", "梁家俊",
];
const TOP_JOCKEYS: [&str; 2] = ["莫雷拉", "潘頓"];
const GOOD_JOCKEYS: [&str; 3] = ["田泰安", "蔡明紹", "何澤堯"];

pub const TRAINERS: [&str; 8] = [
    "呂健威", "蔡約翰", "方嘉柏", "沈集成", "葉楚航", "大衛希斯", "告東尼", "蘇偉賢",
];
const TOP_TRAINERS: [&str; 2] = ["蔡約翰", "呂健威"];

const TRACK_CONDITIONS: [&str; 4] = ["好地", "好至快", "軟地", "黏地"];
const FIRM_TRACKS: [&str; 2] = ["好地", "好至快"];
const CLASSES: [&str; 6] = ["第一班", "第二班", "第三班", "普通賽", "精英班", "盃賽"];
const TOP_CLASSES: [&str; 2] = ["第一班", "盃賽"];
const DISTANCES: [i64; 8] = [1000, 1200, 1400, 1600, 1800, 2000, 2200, 2400];
const ODDS_STD_DEV: f64 = 2.5;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub races: usize,
    pub horses_per_race: usize,
    pub seed: u64,
    pub start_date: NaiveDate,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            races: 200,
            horses_per_race: 12,
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
        }
    }
}

/// One simulated runner.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedRunner {
    pub race_date: NaiveDate,
    pub horse_name: String,
    pub jockey: &'static str,
    pub trainer: &'static str,
    pub actual_weight: i64,
    pub draw: i64,
    pub win_odds: f64,
    pub race_distance: i64,
    pub track_condition: &'static str,
    pub horse_age: i64,
    pub race_class: &'static str,
    pub is_top3: bool,
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.random_range(0..items.len())]
}

fn base_odds(jockey: &str, trainer: &str, draw: i64, race_class: &str) -> f64 {
    let mut odds = 15.0;
    if TOP_JOCKEYS.contains(&jockey) {
        odds *= 0.6;
    }
    if TOP_TRAINERS.contains(&trainer) {
        odds *= 0.7;
    }
    if draw <= 3 {
        odds *= 0.85;
    } else if draw >= 12 {
        odds *= 1.2;
    }
    if TOP_CLASSES.contains(&race_class) {
        odds *= 0.9;
    }
    odds
}

/// Strength score feeding the top-3 probability.
pub fn strength_score(runner: &SimulatedRunner) -> f64 {
    let mut score = (12.0 - runner.win_odds).max(0.0) * 0.9;

    if TOP_JOCKEYS.contains(&runner.jockey) {
        score += 3.0;
    } else if GOOD_JOCKEYS.contains(&runner.jockey) {
        score += 1.5;
    }

    if TOP_TRAINERS.contains(&runner.trainer) {
        score += 2.5;
    }

    score += match runner.draw {
        d if d <= 4 => 2.0,
        d if d <= 8 => 0.5,
        _ => -1.0,
    };

    if FIRM_TRACKS.contains(&runner.track_condition) {
        score += 1.0;
    }

    score += match runner.horse_age {
        4 | 5 => 1.5,
        3 | 6 => 0.5,
        _ => 0.0,
    };

    if TOP_CLASSES.contains(&runner.race_class) {
        score += 1.0;
    } else if runner.race_class == "普通賽" {
        score -= 0.5;
    }

    score
}

/// Probability of a top-3 finish for a strength score.
pub fn top3_probability(score: f64) -> f64 {
    let p = 1.0 / (1.0 + (-0.35 * (score - 7.0)).exp());
    p.clamp(0.05, 0.95)
}

/// Generate the history; one race per day from the start date.
pub fn generate(config: &SimulationConfig) -> Result<Vec<SimulatedRunner>> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, ODDS_STD_DEV)?;
    let mut runners = Vec::with_capacity(config.races * config.horses_per_race);

    for race in 0..config.races {
        let race_date = config.start_date + Duration::days(race as i64);
        let race_distance = pick(&mut rng, &DISTANCES);
        let track_condition = pick(&mut rng, &TRACK_CONDITIONS);
        let race_class = pick(&mut rng, &CLASSES);

        for horse in 0..config.horses_per_race {
            let jockey = pick(&mut rng, &JOCKEYS);
            let trainer = pick(&mut rng, &TRAINERS);
            let actual_weight = rng.random_range(100..135);
            let draw = rng.random_range(1..15);
            let horse_age = rng.random_range(2..9);

            let mean = base_odds(jockey, trainer, draw, race_class);
            let odds = (mean + noise.sample(&mut rng)).max(1.5);
            let win_odds = (odds * 100.0).round() / 100.0;

            let mut runner = SimulatedRunner {
                race_date,
                horse_name: format!("馬_{:03}_{:02}", race, horse),
                jockey,
                trainer,
                actual_weight,
                draw,
                win_odds,
                race_distance,
                track_condition,
                horse_age,
                race_class,
                is_top3: false,
            };
            let p = top3_probability(strength_score(&runner));
            runner.is_top3 = rng.random::<f64>() < p;
            runners.push(runner);
        }
    }

    Ok(runners)
}

/// Lay out the runners as a history frame.
pub fn to_frame(runners: &[SimulatedRunner]) -> Result<DataFrame> {
    let text = |f: fn(&SimulatedRunner) -> String| -> Vec<String> { runners.iter().map(f).collect() };
    let int = |f: fn(&SimulatedRunner) -> i64| -> Vec<i64> { runners.iter().map(f).collect() };

    let columns = vec![
        Column::new(
            "race_date".into(),
            text(|r| r.race_date.format("%Y-%m-%d").to_string()),
        ),
        Column::new("horse_name".into(), text(|r| r.horse_name.clone())),
        Column::new("jockey".into(), text(|r| r.jockey.to_string())),
        Column::new("trainer".into(), text(|r| r.trainer.to_string())),
        Column::new("actual_weight".into(), int(|r| r.actual_weight)),
        Column::new("draw".into(), int(|r| r.draw)),
        Column::new(
            "win_odds".into(),
            runners.iter().map(|r| r.win_odds).collect::<Vec<f64>>(),
        ),
        Column::new("race_distance".into(), int(|r| r.race_distance)),
        Column::new("track_condition".into(), text(|r| r.track_condition.to_string())),
        Column::new("horse_age".into(), int(|r| r.horse_age)),
        Column::new("class".into(), text(|r| r.race_class.to_string())),
        Column::new("is_top3".into(), int(|r| r.is_top3 as i64)),
    ];

    Ok(DataFrame::new(columns)?)
}

/// Encoders covering every simulated jockey and trainer.
pub fn encoders() -> (LabelEncoder, LabelEncoder) {
    (LabelEncoder::fit(JOCKEYS), LabelEncoder::fit(TRAINERS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table;

    fn small() -> SimulationConfig {
        SimulationConfig {
            races: 5,
            horses_per_race: 4,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_generate_shape_and_dates() {
        let runners = generate(&small()).unwrap();
        assert_eq!(runners.len(), 20);
        assert_eq!(runners[0].horse_name, "馬_000_00");
        assert_eq!(runners[19].horse_name, "馬_004_03");
        assert_eq!(runners[4].race_date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }

    #[test]
    fn test_generate_is_deterministic() {
        assert_eq!(generate(&small()).unwrap(), generate(&small()).unwrap());

        let other = SimulationConfig {
            seed: 7,
            ..small()
        };
        assert_ne!(generate(&small()).unwrap(), generate(&other).unwrap());
    }

    #[test]
    fn test_values_within_ranges() {
        for r in generate(&SimulationConfig {
            races: 20,
            ..SimulationConfig::default()
        })
        .unwrap()
        {
            assert!((100..135).contains(&r.actual_weight));
            assert!((1..15).contains(&r.draw));
            assert!((2..9).contains(&r.horse_age));
            assert!(r.win_odds >= 1.5);
            assert!(DISTANCES.contains(&r.race_distance));
        }
    }

    #[test]
    fn test_odds_spread_around_base() {
        let runners = generate(&SimulationConfig::default()).unwrap();
        let residuals: Vec<f64> = runners
            .iter()
            .map(|r| r.win_odds - base_odds(r.jockey, r.trainer, r.draw, r.race_class))
            .collect();
        let n = residuals.len() as f64;
        let mean = residuals.iter().sum::<f64>() / n;
        let std = (residuals.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!(mean.abs() < 0.3, "mean residual {}", mean);
        assert!((2.0..3.0).contains(&std), "residual std {}", std);
    }

    #[test]
    fn test_top3_probability_is_clipped() {
        assert!((top3_probability(7.0) - 0.5).abs() < 1e-12);
        assert_eq!(top3_probability(-50.0), 0.05);
        assert_eq!(top3_probability(50.0), 0.95);
    }

    #[test]
    fn test_strength_score() {
        let runner = SimulatedRunner {
            race_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            horse_name: "馬".to_string(),
            jockey: "潘頓",
            trainer: "呂健威",
            actual_weight: 120,
            draw: 2,
            win_odds: 2.0,
            race_distance: 1200,
            track_condition: "好地",
            horse_age: 4,
            race_class: "盃賽",
            is_top3: false,
        };
        // 9.0 + 3.0 + 2.5 + 2.0 + 1.0 + 1.5 + 1.0
        assert!((strength_score(&runner) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_to_frame_columns() {
        let df = to_frame(&generate(&small()).unwrap()).unwrap();
        assert_eq!(df.height(), 20);
        assert_eq!(table::column_names(&df)[0], "race_date");
        assert!(table::missing_columns(&df, &["is_top3", "win_odds", "class"]).is_empty());
    }

    #[test]
    fn test_encoders_cover_simulated_names() {
        let (jockeys, trainers) = encoders();
        for r in generate(&small()).unwrap() {
            assert!(jockeys.contains(r.jockey));
            assert!(trainers.contains(r.trainer));
        }
    }
}
