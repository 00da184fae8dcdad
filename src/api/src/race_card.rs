//! Uploaded race card parsing.
//!
//! A race card is a CSV with one row per runner. Headers may use the HKJC
//! Chinese names or short English names; both are mapped onto the canonical
//! snake_case columns before validation.

use polars::prelude::{DataFrame, PolarsError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::REQUIRED_COLUMNS;
use crate::table;

/// Header aliases accepted on upload.
pub const COLUMN_ALIASES: [(&str, &str); 19] = [
    ("馬名", "horse_name"),
    ("騎師", "jockey"),
    ("練馬師", "trainer"),
    ("實際負磅", "actual_weight"),
    ("實際 負磅", "actual_weight"),
    ("排位體重", "declared_weight"),
    ("排位 體重", "declared_weight"),
    ("檔位", "draw"),
    ("獨贏賠率", "win_odds"),
    ("獨贏 賠率", "win_odds"),
    ("名次", "finish_position"),
    ("馬號", "horse_number"),
    ("Horse", "horse_name"),
    ("Jockey", "jockey"),
    ("Trainer", "trainer"),
    ("Weight", "actual_weight"),
    ("Draw", "draw"),
    ("Odds", "win_odds"),
    ("Distance", "race_distance"),
];

/// Reasons an upload cannot be turned into race entries.
#[derive(Debug, Error)]
pub enum RaceCardError {
    #[error("file content is empty")]
    EmptyContent,

    #[error("file encoding error, please use UTF-8")]
    Encoding,

    #[error("CSV file is empty")]
    EmptyCsv,

    #[error("unable to parse CSV: {0}")]
    Parse(String),

    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),
}

impl From<PolarsError> for RaceCardError {
    fn from(err: PolarsError) -> Self {
        match err {
            PolarsError::NoData(_) => RaceCardError::EmptyCsv,
            other => RaceCardError::Parse(other.to_string()),
        }
    }
}

/// One runner on the race card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceEntry {
    pub horse_name: String,
    pub jockey: String,
    pub trainer: String,
    pub actual_weight: Option<f64>,
    pub draw: Option<f64>,
    pub win_odds: Option<f64>,
}

/// Parse an uploaded CSV into runners, in file order.
pub fn parse_race_card(bytes: &[u8]) -> Result<Vec<RaceEntry>, RaceCardError> {
    if bytes.is_empty() {
        return Err(RaceCardError::EmptyContent);
    }

    let text = std::str::from_utf8(table::strip_bom(bytes)).map_err(|_| RaceCardError::Encoding)?;
    if text.trim().is_empty() {
        return Err(RaceCardError::EmptyCsv);
    }

    let mut df = table::read_csv_bytes(text.as_bytes().to_vec())?;
    table::normalize_headers(&mut df, &COLUMN_ALIASES)?;

    let missing = table::missing_columns(&df, &REQUIRED_COLUMNS);
    if !missing.is_empty() {
        return Err(RaceCardError::MissingColumns(missing));
    }
    if df.height() == 0 {
        return Err(RaceCardError::EmptyCsv);
    }

    entries_from_frame(&df)
}

fn entries_from_frame(df: &DataFrame) -> Result<Vec<RaceEntry>, RaceCardError> {
    let names = table::string_column(df, "horse_name")?;
    let jockeys = table::string_column(df, "jockey")?;
    let trainers = table::string_column(df, "trainer")?;
    let weights = table::f64_column(df, "actual_weight")?;
    let draws = table::f64_column(df, "draw")?;
    let odds = table::f64_column(df, "win_odds")?;

    let entries = (0..df.height())
        .map(|i| RaceEntry {
            horse_name: names[i].clone().unwrap_or_default(),
            jockey: jockeys[i].clone().unwrap_or_default(),
            trainer: trainers[i].clone().unwrap_or_default(),
            actual_weight: weights[i],
            draw: draws[i],
            win_odds: odds[i],
        })
        .collect();

    Ok(entries)
}
