//! Offline win odds for race cards that arrive without them.
//!
//! Known horses get fixed test odds; any other named horse gets a seeded draw
//! between 2.0 and 20.0. Odds already on the card are kept.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

use crate::clean::suffixed_path;
use crate::race_card::COLUMN_ALIASES;
use crate::table;

pub const DEFAULT_ODDS: [(&str, f64); 12] = [
    ("浪漫勇士", 2.2),
    ("金鑽貴人", 4.5),
    ("加州星球", 3.8),
    ("美麗同享", 6.0),
    ("賢者無敵", 5.5),
    ("好眼光", 7.0),
    ("包裝猛將", 12.0),
    ("飛鷹翱翔", 15.0),
    ("嘉應高昇", 8.5),
    ("永遠美麗", 9.0),
    ("自勝者強", 5.0),
    ("發財先鋒", 10.0),
];

/// Written for rows without a horse name.
pub const MISSING_ODDS: f64 = 999.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FillSummary {
    pub rows: usize,
    pub filled: usize,
    pub output: PathBuf,
}

pub fn default_odds(horse_name: &str) -> Option<f64> {
    DEFAULT_ODDS
        .iter()
        .find(|(name, _)| *name == horse_name)
        .map(|(_, odds)| *odds)
}

pub fn simulated_odds(horse_name: Option<&str>, rng: &mut StdRng) -> f64 {
    match horse_name {
        None => MISSING_ODDS,
        Some(name) => default_odds(name)
            .unwrap_or_else(|| (rng.random_range(2.0..=20.0_f64) * 10.0).round() / 10.0),
    }
}

/// Fill missing `win_odds` in `input`; output defaults to `<stem>_with_odds<.ext>`.
pub fn fill_odds(input: &Path, output: Option<&Path>, seed: u64) -> Result<FillSummary> {
    let mut df = table::read_csv_file(input)?;
    table::normalize_headers(&mut df, &COLUMN_ALIASES)?;
    if !table::missing_columns(&df, &["horse_name"]).is_empty() {
        bail!("CSV must have a horse_name (馬名) column");
    }

    let names = table::string_column(&df, "horse_name")?;
    let current = if table::missing_columns(&df, &["win_odds"]).is_empty() {
        table::f64_column(&df, "win_odds")?
    } else {
        vec![None; df.height()]
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let mut filled = 0;
    let odds: Vec<Option<f64>> = names
        .iter()
        .zip(current)
        .map(|(name, odds)| match odds.filter(|&o| o > 0.0) {
            Some(o) => Some(o),
            None => {
                filled += 1;
                let name = name.as_deref().map(str::trim).filter(|n| !n.is_empty());
                Some(simulated_odds(name, &mut rng))
            }
        })
        .collect();
    table::set_f64_column(&mut df, "win_odds", odds)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| suffixed_path(input, "_with_odds"));
    table::write_csv(&mut df, &output)?;

    Ok(FillSummary {
        rows: df.height(),
        filled,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_odds() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(simulated_odds(Some("好眼光"), &mut rng), 7.0);
        assert_eq!(simulated_odds(None, &mut rng), MISSING_ODDS);
        for _ in 0..50 {
            let odds = simulated_odds(Some("新馬"), &mut rng);
            assert!((2.0..=20.0).contains(&odds));
            assert_eq!(odds, (odds * 10.0).round() / 10.0);
        }
    }

    #[test]
    fn test_fill_odds_keeps_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("next_race.csv");
        std::fs::write(
            &input,
            "馬名,騎師,獨贏賠率\n浪漫勇士,潘頓,3.5\n金鑽貴人,莫雷拉,\n新秀,布文,SCR\n",
        )
        .unwrap();

        let summary = fill_odds(&input, None, 42).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.filled, 2);
        assert_eq!(summary.output, dir.path().join("next_race_with_odds.csv"));

        let out = table::read_csv_file(&summary.output).unwrap();
        let odds = table::f64_column(&out, "win_odds").unwrap();
        assert_eq!(odds[0], Some(3.5));
        assert_eq!(odds[1], Some(4.5));
        assert!((2.0..=20.0).contains(&odds[2].unwrap()));
    }

    #[test]
    fn test_fill_odds_adds_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("card.csv");
        let output = dir.path().join("filled.csv");
        std::fs::write(&input, "horse_name,jockey\n好眼光,布文\n,潘頓\n").unwrap();

        let summary = fill_odds(&input, Some(&output), 7).unwrap();
        assert_eq!(summary.filled, 2);

        let out = table::read_csv_file(&output).unwrap();
        let odds = table::f64_column(&out, "win_odds").unwrap();
        assert_eq!(odds, vec![Some(7.0), Some(MISSING_ODDS)]);
    }

    #[test]
    fn test_fill_odds_requires_horse_name() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("card.csv");
        std::fs::write(&input, "jockey,draw\n潘頓,3\n").unwrap();
        assert!(fill_odds(&input, None, 42).is_err());
    }
}
