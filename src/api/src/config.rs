//! Configuration for the HKJC API.

use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Model artefact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_jockey_encoder")]
    pub jockey_encoder: String,
    #[serde(default = "default_trainer_encoder")]
    pub trainer_encoder: String,
}

fn default_model_path() -> String {
    "models/top3_model.onnx".to_string()
}

fn default_jockey_encoder() -> String {
    "models/jockey_encoder.json".to_string()
}

fn default_trainer_encoder() -> String {
    "models/trainer_encoder.json".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            jockey_encoder: default_jockey_encoder(),
            trainer_encoder: default_trainer_encoder(),
        }
    }
}

/// Betting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingConfig {
    /// Minimum edge (model probability minus implied probability) for a value bet
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: f64,
    /// Upper bound on the recommended Kelly stake
    #[serde(default = "default_kelly_cap")]
    pub kelly_cap: f64,
    /// Top-3 probability is divided by this to approximate the win probability
    #[serde(default = "default_win_prob_divisor")]
    pub win_prob_divisor: f64,
    #[serde(default = "default_strong_value")]
    pub strong_value: f64,
    #[serde(default = "default_moderate_value")]
    pub moderate_value: f64,
}

fn default_edge_threshold() -> f64 {
    0.05
}

fn default_kelly_cap() -> f64 {
    0.1
}

fn default_win_prob_divisor() -> f64 {
    3.0
}

fn default_strong_value() -> f64 {
    0.4
}

fn default_moderate_value() -> f64 {
    0.2
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self {
            edge_threshold: default_edge_threshold(),
            kelly_cap: default_kelly_cap(),
            win_prob_divisor: default_win_prob_divisor(),
            strong_value: default_strong_value(),
            moderate_value: default_moderate_value(),
        }
    }
}

/// Prediction history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "predictions_history.db".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub betting: BettingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (HKJC_SERVER__PORT,
            // HKJC_BETTING__EDGE_THRESHOLD, etc.)
            .add_source(
                config::Environment::with_prefix("HKJC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; 5] = [
    "actual_weight",
    "draw",
    "win_odds",
    "jockey_encoded",
    "trainer_encoded",
];

/// Columns every uploaded race card must carry
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "horse_name",
    "jockey",
    "trainer",
    "actual_weight",
    "draw",
    "win_odds",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 10000);
        assert!((config.betting.edge_threshold - 0.05).abs() < 1e-12);
        assert!((config.betting.kelly_cap - 0.1).abs() < 1e-12);
        assert_eq!(config.history.db_path, "predictions_history.db");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"server": {"port": 8501}, "betting": {"kelly_cap": 0.05}}"#)
                .unwrap();
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!((config.betting.kelly_cap - 0.05).abs() < 1e-12);
        assert!((config.betting.win_prob_divisor - 3.0).abs() < 1e-12);
        assert_eq!(config.model.path, "models/top3_model.onnx");
    }

    #[test]
    fn test_env_overrides_nested_keys() {
        std::env::set_var("HKJC_SERVER__PORT", "9999");
        std::env::set_var("HKJC_BETTING__EDGE_THRESHOLD", "0.08");
        let config = AppConfig::load();
        std::env::remove_var("HKJC_SERVER__PORT");
        std::env::remove_var("HKJC_BETTING__EDGE_THRESHOLD");

        let config = config.unwrap();
        assert_eq!(config.server.port, 9999);
        assert!((config.betting.edge_threshold - 0.08).abs() < 1e-12);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!((config.betting.kelly_cap - 0.1).abs() < 1e-12);
    }
}
