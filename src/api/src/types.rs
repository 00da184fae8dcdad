//! Request and response types for the HKJC API.

use serde::{Deserialize, Serialize};

use crate::betting::{ConfidenceLevel, ValueTier};
use crate::storage::HistoryRecord;

/// Per-horse prediction with value metrics (all floats rounded to 4 decimals)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub horse_name: String,
    pub jockey: String,
    pub trainer: String,
    pub win_odds: f64,
    pub predicted_top3_prob: f64,
    pub implied_probability: f64,
    pub value_score: f64,
    pub kelly_fraction: f64,
}

/// Race card prediction response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<PredictionRow>,
}

/// Single horse prediction request
#[derive(Debug, Clone, Deserialize)]
pub struct SinglePredictRequest {
    pub jockey: String,
    pub trainer: String,
    pub actual_weight: f64,
    pub draw: f64,
    pub win_odds: f64,
}

/// Single horse prediction response
#[derive(Debug, Serialize)]
pub struct SinglePredictResponse {
    pub predicted_top3_prob: f64,
    pub top3_percent: f64,
    pub confidence: ConfidenceLevel,
    pub implied_probability: f64,
    pub value_score: f64,
    pub kelly_fraction: f64,
    pub value_tier: ValueTier,
    pub recommendation: String,
}

/// Stored predictions, newest race date first
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub predictions: Vec<HistoryRecord>,
}

/// Settle a stored prediction with the actual race outcome
#[derive(Debug, Deserialize)]
pub struct ResultUpdateRequest {
    pub actual_result: String,
}

/// Root endpoint response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
}

/// Model info response
#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_path: String,
    pub model_kind: Option<String>,
    pub num_features: usize,
    pub feature_names: Vec<String>,
    pub jockeys: Vec<String>,
    pub trainers: Vec<String>,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}
