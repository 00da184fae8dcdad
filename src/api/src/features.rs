//! Historical form features.
//!
//! Each row of a race history gets features computed only from the same
//! horse's earlier races, so they are safe to train on.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use polars::prelude::DataFrame;

use crate::table;

const REQUIRED: [&str; 5] = [
    "race_date",
    "horse_name",
    "is_top3",
    "win_odds",
    "actual_weight",
];

/// Date formats accepted for `race_date`.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Feature columns appended to the history, in output order.
pub const FEATURE_COLUMNS: [&str; 7] = [
    "last_is_top3",
    "top3_rate_last_1",
    "top3_rate_last_3",
    "top3_rate_last_5",
    "avg_odds_last_3",
    "avg_actual_weight_last_3",
    "days_since_last_race",
];

pub fn parse_race_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// One past or current race of a horse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaceRecord {
    pub date: NaiveDate,
    pub is_top3: Option<f64>,
    pub win_odds: Option<f64>,
    pub actual_weight: Option<f64>,
}

/// Form features for one race; all `None` for a horse's first race.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FormFeatures {
    pub last_is_top3: Option<f64>,
    pub top3_rate_last_1: Option<f64>,
    pub top3_rate_last_3: Option<f64>,
    pub top3_rate_last_5: Option<f64>,
    pub avg_odds_last_3: Option<f64>,
    pub avg_actual_weight_last_3: Option<f64>,
    pub days_since_last_race: Option<f64>,
}

impl FormFeatures {
    fn values(&self) -> [Option<f64>; 7] {
        [
            self.last_is_top3,
            self.top3_rate_last_1,
            self.top3_rate_last_3,
            self.top3_rate_last_5,
            self.avg_odds_last_3,
            self.avg_actual_weight_last_3,
            self.days_since_last_race,
        ]
    }
}

/// Mean of the present values; `None` when there are none.
fn mean<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Features for every race of a single horse, given in date order.
///
/// `top3_rate_last_1` averages over all earlier races, not just the last one.
pub fn horse_form(races: &[RaceRecord]) -> Vec<FormFeatures> {
    races
        .iter()
        .enumerate()
        .map(|(i, race)| {
            if i == 0 {
                return FormFeatures::default();
            }
            let past = &races[..i];
            let last_3 = &past[past.len().saturating_sub(3)..];
            let last_5 = &past[past.len().saturating_sub(5)..];
            let prev = past[i - 1];

            FormFeatures {
                last_is_top3: prev.is_top3,
                top3_rate_last_1: mean(past.iter().map(|r| r.is_top3)),
                top3_rate_last_3: mean(last_3.iter().map(|r| r.is_top3)),
                top3_rate_last_5: mean(last_5.iter().map(|r| r.is_top3)),
                avg_odds_last_3: mean(last_3.iter().map(|r| r.win_odds)),
                avg_actual_weight_last_3: mean(last_3.iter().map(|r| r.actual_weight)),
                days_since_last_race: Some((race.date - prev.date).num_days() as f64),
            }
        })
        .collect()
}

/// Sort the history by horse and date and append the form feature columns.
///
/// `race_date` is rewritten as `%Y-%m-%d`.
pub fn add_historical_features(df: &DataFrame) -> Result<DataFrame> {
    let missing = table::missing_columns(df, &REQUIRED);
    if !missing.is_empty() {
        bail!("Missing required columns: {:?}", missing);
    }

    let names = table::string_column(df, "horse_name")?;
    let dates = table::string_column(df, "race_date")?
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let raw = d.unwrap_or_default();
            parse_race_date(&raw)
                .with_context(|| format!("Invalid race_date {:?} at row {}", raw, i + 1))
        })
        .collect::<Result<Vec<_>>>()?;
    let top3 = table::f64_column(df, "is_top3")?;
    let odds = table::f64_column(df, "win_odds")?;
    let weights = table::f64_column(df, "actual_weight")?;

    let mut order: Vec<usize> = (0..df.height()).collect();
    // Unnamed rows go last and get no features
    order.sort_by(|&a, &b| {
        (names[a].is_none(), &names[a], dates[a]).cmp(&(names[b].is_none(), &names[b], dates[b]))
    });

    let mut features = Vec::with_capacity(order.len());
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && names[order[end]] == names[order[start]] {
            end += 1;
        }
        if names[order[start]].is_none() {
            features.extend(std::iter::repeat(FormFeatures::default()).take(end - start));
            start = end;
            continue;
        }
        let races: Vec<RaceRecord> = order[start..end]
            .iter()
            .map(|&i| RaceRecord {
                date: dates[i],
                is_top3: top3[i],
                win_odds: odds[i],
                actual_weight: weights[i],
            })
            .collect();
        features.extend(horse_form(&races));
        start = end;
    }

    let mut out = table::take_rows(df, &order)?;
    table::set_str_column(
        &mut out,
        "race_date",
        order
            .iter()
            .map(|&i| dates[i].format("%Y-%m-%d").to_string())
            .collect(),
    )?;
    for (k, name) in FEATURE_COLUMNS.iter().enumerate() {
        let values = features.iter().map(|f| f.values()[k]).collect();
        table::set_f64_column(&mut out, name, values)?;
    }

    Ok(out)
}
