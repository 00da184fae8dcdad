//! SQLite storage for the prediction history
//!
//! Every batch predicted through the API is saved here so it can be
//! reviewed and settled with the actual result after the race.

pub mod repository;
pub mod schema;

pub use repository::{ActualResult, HistoryRecord, PredictionRepository};
