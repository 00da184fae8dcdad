//! HKJC Race Prediction API
//!
//! REST API and CLI for top-3 finish predictions with value betting signals.

mod backtest;
mod betting;
mod clean;
mod cli;
mod config;
mod dataset;
mod encoder;
mod features;
mod model;
mod odds;
mod predictor;
mod race_card;
mod routes;
mod simulate;
mod storage;
mod table;
mod types;
mod value_bets;

use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::encoder::LabelEncoder;
use crate::model::load_model;
use crate::routes::{build_router, AppState};
use crate::storage::PredictionRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => run_server(host, port).await,
        Commands::Predict {
            input,
            format,
            output,
            model,
        } => cli::run_predict(input, format, output, model),
        Commands::ValueBets {
            input,
            output,
            threshold,
        } => cli::run_value_bets(input, output, threshold),
        Commands::Features { input, output } => cli::run_features(input, output),
        Commands::SelectBets {
            history,
            predictions,
            output,
            threshold,
        } => cli::run_select_bets(history, predictions, output, threshold),
        Commands::Backtest {
            input,
            detail_output,
            format,
        } => cli::run_backtest(input, detail_output, format),
        Commands::BuildDataset { raw_dir, output } => cli::run_build_dataset(raw_dir, output),
        Commands::FillOdds {
            input,
            output,
            seed,
        } => cli::run_fill_odds(input, output, seed),
        Commands::Clean { input, output } => cli::run_clean(input, output),
        Commands::Simulate {
            output,
            races,
            horses,
            seed,
            encoders_dir,
        } => cli::run_simulate(output, races, horses, seed, encoders_dir),
        Commands::History { format } => cli::run_history(format),
    }
}

fn load_encoder(kind: &str, path: &str) -> Option<LabelEncoder> {
    match LabelEncoder::from_file(path) {
        Ok(enc) => {
            tracing::info!("Loaded {} encoder with {} classes", kind, enc.classes().len());
            Some(enc)
        }
        Err(e) => {
            tracing::warn!("Failed to load {} encoder: {:#}, unknown names encode as -1", kind, e);
            None
        }
    }
}

/// Run the API server.
async fn run_server(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hkjc_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Override with CLI args
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("Model path: {}", config.model.path);

    // The server still starts without a model; /predict then answers 500
    let model = match load_model(&config.model.path) {
        Ok(m) => {
            tracing::info!("Model loaded successfully ({})", m.kind());
            Some(m)
        }
        Err(e) => {
            tracing::warn!("Failed to load model: {:#}", e);
            None
        }
    };

    let jockey_encoder = load_encoder("jockey", &config.model.jockey_encoder);
    let trainer_encoder = load_encoder("trainer", &config.model.trainer_encoder);

    let history = PredictionRepository::new(Path::new(&config.history.db_path))?;
    tracing::info!(
        "History database: {} ({} predictions)",
        config.history.db_path,
        history.get_prediction_count()?
    );

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let state = Arc::new(AppState {
        model,
        jockey_encoder,
        trainer_encoder,
        config,
        history: Mutex::new(history),
    });

    let app = build_router(state);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
