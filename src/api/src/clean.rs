//! Race card CSV cleaning.
//!
//! Numeric cells scraped from racing sites often carry thousands separators
//! or dashes for "no data". Those characters are stripped, and rows that still
//! do not parse are dropped.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::table;

pub const REQUIRED_COLUMNS: [&str; 7] = [
    "horse_name",
    "jockey",
    "trainer",
    "actual_weight",
    "draw",
    "win_odds",
    "race_distance",
];

pub const NUMERIC_COLUMNS: [&str; 4] = ["actual_weight", "draw", "win_odds", "race_distance"];

const STRIP_CHARS: [char; 4] = [',', ' ', '–', '-'];

/// Outcome of a cleaning run.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanSummary {
    pub original_rows: usize,
    pub kept_rows: usize,
    pub output: PathBuf,
}

impl CleanSummary {
    pub fn dropped_rows(&self) -> usize {
        self.original_rows - self.kept_rows
    }
}

/// `<stem><suffix><.ext>` next to the input.
pub fn suffixed_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

pub fn default_output_path(input: &Path) -> PathBuf {
    suffixed_path(input, "_cleaned")
}

/// Parse a numeric cell after stripping separators and dashes.
pub fn clean_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !STRIP_CHARS.contains(c)).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decode as UTF-8, falling back to Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = table::strip_bom(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            tracing::debug!("Input is not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

/// Clean `input` and write the result to `output` (or the default path).
pub fn clean_race_csv(input: &Path, output: Option<&Path>) -> Result<CleanSummary> {
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let text = decode_text(&bytes);
    let mut df = table::read_csv_bytes(text.into_bytes())
        .with_context(|| format!("Failed to parse CSV {}", input.display()))?;

    let missing = table::missing_columns(&df, &REQUIRED_COLUMNS);
    if !missing.is_empty() {
        bail!("Missing required columns: {:?}", missing);
    }

    let original_rows = df.height();
    let mut valid = vec![true; original_rows];
    for name in NUMERIC_COLUMNS {
        let values: Vec<Option<f64>> = table::string_column(&df, name)?
            .into_iter()
            .map(|v| v.as_deref().and_then(clean_number))
            .collect();
        for (keep, v) in valid.iter_mut().zip(&values) {
            *keep &= v.is_some();
        }
        table::set_f64_column(&mut df, name, values)?;
    }

    let mut cleaned = table::filter_rows(&df, &valid)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));
    table::write_csv(&mut cleaned, &output)?;

    Ok(CleanSummary {
        original_rows,
        kept_rows: cleaned.height(),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_number() {
        assert_eq!(clean_number("1,200"), Some(1200.0));
        assert_eq!(clean_number(" 133 "), Some(133.0));
        assert_eq!(clean_number("--"), None);
        assert_eq!(clean_number("–"), None);
        assert_eq!(clean_number("nan"), None);
        assert_eq!(clean_number("SCR"), None);
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("data/next_race.csv")),
            PathBuf::from("data/next_race_cleaned.csv")
        );
        assert_eq!(
            default_output_path(Path::new("race")),
            PathBuf::from("race_cleaned")
        );
    }

    #[test]
    fn test_decode_latin1_fallback() {
        assert_eq!(decode_text(b"caf\xe9"), "café");
        assert_eq!(decode_text("\u{feff}馬名".as_bytes()), "馬名");
    }

    #[test]
    fn test_clean_race_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("next_race.csv");
        std::fs::write(
            &input,
            "horse_name,jockey,trainer,actual_weight,draw,win_odds,race_distance\n\
             A,潘頓,沈集成,133,5,2.5,\"1,200\"\n\
             B,布文,韋達,128,--,4.0,1200\n\
             C,田泰安,呂健威,120,3,12,\"1,650\"\n",
        )
        .unwrap();

        let summary = clean_race_csv(&input, None).unwrap();
        assert_eq!(summary.original_rows, 3);
        assert_eq!(summary.kept_rows, 2);
        assert_eq!(summary.dropped_rows(), 1);
        assert_eq!(summary.output, dir.path().join("next_race_cleaned.csv"));

        let out = table::read_csv_file(&summary.output).unwrap();
        let distance = table::f64_column(&out, "race_distance").unwrap();
        assert_eq!(distance, vec![Some(1200.0), Some(1650.0)]);
        let names = table::string_column(&out, "horse_name").unwrap();
        assert_eq!(names[1].as_deref(), Some("C"));
    }

    #[test]
    fn test_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.csv");
        std::fs::write(&input, "horse_name,jockey\nA,B\n").unwrap();
        let err = clean_race_csv(&input, None).unwrap_err();
        assert!(err.to_string().contains("race_distance"));
    }
}
