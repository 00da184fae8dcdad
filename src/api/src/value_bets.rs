//! Value-bet report over a saved predictions file.

use anyhow::{bail, Result};
use polars::prelude::DataFrame;

use crate::betting::{find_value_bets, PredictedRunner};
use crate::table;

const REQUIRED: [&str; 3] = ["horse_name", "win_odds", "predicted_top3_prob"];

/// Keep rows whose edge clears `threshold`, adding `edge` and `expected_return`.
///
/// Rows with non-numeric odds or probability are dropped first. Every other
/// input column is carried through unchanged.
pub fn value_bets_frame(df: &DataFrame, threshold: f64) -> Result<DataFrame> {
    let missing = table::missing_columns(df, &REQUIRED);
    if !missing.is_empty() {
        bail!("Missing required columns: {:?}", missing);
    }

    let odds = table::f64_column(df, "win_odds")?;
    let probs = table::f64_column(df, "predicted_top3_prob")?;
    let valid: Vec<bool> = odds
        .iter()
        .zip(&probs)
        .map(|(o, p)| o.is_some() && p.is_some())
        .collect();
    if !valid.contains(&true) {
        bail!("No valid rows to process");
    }

    let valid_df = table::filter_rows(df, &valid)?;
    let names = table::string_column(&valid_df, "horse_name")?;
    let runners: Vec<PredictedRunner> = names
        .into_iter()
        .zip(table::f64_column(&valid_df, "win_odds")?)
        .zip(table::f64_column(&valid_df, "predicted_top3_prob")?)
        .map(|((name, win_odds), prob)| PredictedRunner {
            horse_name: name.unwrap_or_default(),
            win_odds,
            predicted_top3_prob: prob,
        })
        .collect();

    let bets = find_value_bets(&runners, threshold);
    let rows: Vec<usize> = bets.iter().map(|b| b.index).collect();

    let mut out = table::take_rows(&valid_df, &rows)?;
    table::set_f64_column(
        &mut out,
        "win_odds",
        bets.iter().map(|b| Some(b.win_odds)).collect(),
    )?;
    table::set_f64_column(
        &mut out,
        "predicted_top3_prob",
        bets.iter().map(|b| Some(b.predicted_top3_prob)).collect(),
    )?;
    table::set_f64_column(&mut out, "edge", bets.iter().map(|b| Some(b.edge)).collect())?;
    table::set_f64_column(
        &mut out,
        "expected_return",
        bets.iter().map(|b| Some(b.expected_return)).collect(),
    )?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(csv: &str) -> DataFrame {
        table::read_csv_bytes(csv.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_filters_by_edge_and_keeps_columns() {
        let df = frame(
            "horse_name,jockey,win_odds,predicted_top3_prob\n\
             A,潘頓,4.0,0.5\n\
             B,布文,2.0,0.52\n\
             C,韋達,SCR,0.9\n\
             D,田泰安,10,0.2\n",
        );
        let out = value_bets_frame(&df, 0.05).unwrap();

        assert_eq!(out.height(), 2);
        let names = table::string_column(&out, "horse_name").unwrap();
        assert_eq!(names, vec![Some("A".to_string()), Some("D".to_string())]);
        let jockeys = table::string_column(&out, "jockey").unwrap();
        assert_eq!(jockeys[1].as_deref(), Some("田泰安"));
        assert_eq!(
            table::f64_column(&out, "edge").unwrap(),
            vec![Some(0.25), Some(0.1)]
        );
        assert_eq!(
            table::f64_column(&out, "expected_return").unwrap(),
            vec![Some(1.0), Some(1.0)]
        );
    }

    #[test]
    fn test_no_value_bets_is_empty_frame() {
        let df = frame("horse_name,win_odds,predicted_top3_prob\nA,2.0,0.4\n");
        let out = value_bets_frame(&df, 0.05).unwrap();
        assert_eq!(out.height(), 0);
        assert!(table::column_names(&out).contains(&"edge".to_string()));
    }

    #[test]
    fn test_missing_columns() {
        let df = frame("horse_name,win_odds\nA,2.0\n");
        let err = value_bets_frame(&df, 0.05).unwrap_err();
        assert!(err.to_string().contains("predicted_top3_prob"));
    }

    #[test]
    fn test_no_valid_rows() {
        let df = frame("horse_name,win_odds,predicted_top3_prob\nA,x,0.4\nB,3.0,y\n");
        assert!(value_bets_frame(&df, 0.05).is_err());
    }
}
