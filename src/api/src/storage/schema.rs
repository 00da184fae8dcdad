//! SQLite schema for the prediction history
//!
//! Tables:
//! - predictions: One row per predicted horse, settled later with the actual result

use rusqlite::{Connection, Result};

/// Create all tables in the database
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_date TEXT NOT NULL,
            horse_name TEXT NOT NULL,
            jockey TEXT,
            trainer TEXT,
            win_odds REAL,
            predicted_top3_prob REAL,
            value_score REAL,
            kelly_fraction REAL,
            actual_result TEXT DEFAULT 'unknown'
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_predictions_date ON predictions(race_date)",
        [],
    )?;

    Ok(())
}
