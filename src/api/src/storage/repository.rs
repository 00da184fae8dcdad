//! SQLite repository for the prediction history

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::schema::create_tables;
use crate::types::PredictionRow;

/// Outcome of a predicted horse once the race has been run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualResult {
    Top3,
    NotTop3,
    Unknown,
}

impl ActualResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActualResult::Top3 => "top3",
            ActualResult::NotTop3 => "not_top3",
            ActualResult::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActualResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActualResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "top3" => Ok(ActualResult::Top3),
            "not_top3" => Ok(ActualResult::NotTop3),
            "unknown" => Ok(ActualResult::Unknown),
            other => anyhow::bail!("Invalid actual result: {}", other),
        }
    }
}

/// A stored prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub race_date: String,
    pub horse_name: String,
    pub jockey: Option<String>,
    pub trainer: Option<String>,
    pub win_odds: Option<f64>,
    pub predicted_top3_prob: Option<f64>,
    pub value_score: Option<f64>,
    pub kelly_fraction: Option<f64>,
    pub actual_result: String,
}

/// Repository for saved predictions
pub struct PredictionRepository {
    conn: Connection,
}

impl PredictionRepository {
    /// Create a new repository, initializing the database if needed
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(db_path).context("Failed to open database")?;
        create_tables(&conn)?;

        Ok(Self { conn })
    }

    /// Create an in-memory repository (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self { conn })
    }

    /// Save a batch of predictions in one transaction.
    ///
    /// `race_date` defaults to today's local date.
    pub fn save_predictions(
        &mut self,
        rows: &[PredictionRow],
        race_date: Option<NaiveDate>,
    ) -> Result<usize> {
        let date = race_date
            .unwrap_or_else(|| Local::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO predictions
                (race_date, horse_name, jockey, trainer, win_odds,
                 predicted_top3_prob, value_score, kelly_fraction, actual_result)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for row in rows {
                stmt.execute(params![
                    date,
                    row.horse_name,
                    row.jockey,
                    row.trainer,
                    row.win_odds,
                    row.predicted_top3_prob,
                    row.value_score,
                    row.kelly_fraction,
                    ActualResult::Unknown.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(rows.len())
    }

    /// All predictions, newest race date first, best value first within a date
    pub fn get_all_predictions(&self) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, race_date, horse_name, jockey, trainer, win_odds,
                   predicted_top3_prob, value_score, kelly_fraction, actual_result
            FROM predictions
            ORDER BY race_date DESC, value_score DESC
            "#,
        )?;

        let records = stmt
            .query_map([], |row| {
                let actual: Option<String> = row.get(9)?;
                Ok(HistoryRecord {
                    id: row.get(0)?,
                    race_date: row.get(1)?,
                    horse_name: row.get(2)?,
                    jockey: row.get(3)?,
                    trainer: row.get(4)?,
                    win_odds: row.get(5)?,
                    predicted_top3_prob: row.get(6)?,
                    value_score: row.get(7)?,
                    kelly_fraction: row.get(8)?,
                    actual_result: actual.unwrap_or_else(|| ActualResult::Unknown.to_string()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Settle a prediction. Returns `false` when no row has this id.
    pub fn set_actual_result(&self, id: i64, result: ActualResult) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE predictions SET actual_result = ?1 WHERE id = ?2",
            params![result.as_str(), id],
        )?;
        Ok(updated > 0)
    }

    /// Get prediction count
    pub fn get_prediction_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, value_score: f64) -> PredictionRow {
        PredictionRow {
            horse_name: name.to_string(),
            jockey: "潘頓".to_string(),
            trainer: "沈集成".to_string(),
            win_odds: 4.0,
            predicted_top3_prob: 0.5,
            implied_probability: 0.25,
            value_score,
            kelly_fraction: 0.0,
        }
    }

    fn date(s: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    }

    #[test]
    fn test_save_and_get_predictions() {
        let mut repo = PredictionRepository::in_memory().unwrap();
        let saved = repo
            .save_predictions(&[row("A", 0.1), row("B", 0.3)], date("2025-03-01"))
            .unwrap();
        assert_eq!(saved, 2);

        let records = repo.get_all_predictions().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].horse_name, "B");
        assert_eq!(records[0].race_date, "2025-03-01");
        assert_eq!(records[0].actual_result, "unknown");
        assert_eq!(records[1].jockey.as_deref(), Some("潘頓"));
    }

    #[test]
    fn test_ordering_by_date_then_value() {
        let mut repo = PredictionRepository::in_memory().unwrap();
        repo.save_predictions(&[row("old", 0.9)], date("2025-01-01"))
            .unwrap();
        repo.save_predictions(&[row("low", 0.1), row("high", 0.2)], date("2025-02-01"))
            .unwrap();

        let names: Vec<String> = repo
            .get_all_predictions()
            .unwrap()
            .into_iter()
            .map(|r| r.horse_name)
            .collect();
        assert_eq!(names, vec!["high", "low", "old"]);
    }

    #[test]
    fn test_default_date_is_today() {
        let mut repo = PredictionRepository::in_memory().unwrap();
        repo.save_predictions(&[row("A", 0.0)], None).unwrap();

        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(repo.get_all_predictions().unwrap()[0].race_date, today);
    }

    #[test]
    fn test_set_actual_result() {
        let mut repo = PredictionRepository::in_memory().unwrap();
        repo.save_predictions(&[row("A", 0.0)], date("2025-01-01"))
            .unwrap();
        let id = repo.get_all_predictions().unwrap()[0].id;

        assert!(repo.set_actual_result(id, ActualResult::Top3).unwrap());
        assert_eq!(repo.get_all_predictions().unwrap()[0].actual_result, "top3");

        assert!(!repo.set_actual_result(id + 100, ActualResult::NotTop3).unwrap());
    }

    #[test]
    fn test_count_and_empty_batch() {
        let mut repo = PredictionRepository::in_memory().unwrap();
        assert_eq!(repo.save_predictions(&[], None).unwrap(), 0);
        assert_eq!(repo.get_prediction_count().unwrap(), 0);

        repo.save_predictions(&[row("A", 0.0), row("B", 0.0)], None)
            .unwrap();
        assert_eq!(repo.get_prediction_count().unwrap(), 2);
    }

    #[test]
    fn test_actual_result_parse() {
        assert_eq!("top3".parse::<ActualResult>().unwrap(), ActualResult::Top3);
        assert_eq!(
            "not_top3".parse::<ActualResult>().unwrap(),
            ActualResult::NotTop3
        );
        assert!("win".parse::<ActualResult>().is_err());
    }

    #[test]
    fn test_file_backed_repository() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/history.db");
        {
            let mut repo = PredictionRepository::new(&path).unwrap();
            repo.save_predictions(&[row("A", 0.0)], None).unwrap();
        }
        let repo = PredictionRepository::new(&path).unwrap();
        assert_eq!(repo.get_prediction_count().unwrap(), 1);
    }
}
