//! CLI commands for hkjc-api.
//!
//! Besides the API server, every file-based pipeline runs from here: dataset
//! building, cleaning, odds filling, prediction, value bets, feature
//! engineering, bet selection and backtest.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use polars::prelude::{Column, DataFrame};
use std::path::{Path, PathBuf};

use crate::backtest::{
    detail_frame, load_bets, print_backtest_table, select_high_value_bets, BacktestResults,
};
use crate::clean::clean_race_csv;
use crate::config::AppConfig;
use crate::dataset::build_dataset;
use crate::encoder::LabelEncoder;
use crate::features::add_historical_features;
use crate::model::load_model;
use crate::odds::fill_odds;
use crate::predictor::{predict_entries, Encoders};
use crate::race_card::parse_race_card;
use crate::simulate::{self, SimulationConfig};
use crate::storage::PredictionRepository;
use crate::table;
use crate::types::{PredictResponse, PredictionRow};
use crate::value_bets::value_bets_frame;

#[derive(Parser)]
#[command(name = "hkjc-api")]
#[command(version, about = "HKJC top-3 prediction API and value betting tools", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Predict top-3 probabilities for a race card CSV
    Predict {
        /// Path to race card CSV
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output format (json, table)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Also write predictions to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model path override
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Filter saved predictions down to value bets
    ValueBets {
        #[arg(short, long, default_value = "data/predictions.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "data/value_bets_today.csv")]
        output: PathBuf,

        /// Minimum edge (defaults to betting.edge_threshold)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Add historical form features to a race history CSV
    Features {
        #[arg(short, long, default_value = "data/historical_races.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "data/historical_races_with_features.csv")]
        output: PathBuf,
    },

    /// Select high-value bets from history joined with model probabilities
    SelectBets {
        #[arg(long, default_value = "data/historical_races_with_features.csv")]
        history: PathBuf,

        #[arg(long, default_value = "data/predictions_train.csv")]
        predictions: PathBuf,

        #[arg(short, long, default_value = "data/high_value_bets_with_labels.csv")]
        output: PathBuf,

        /// Minimum edge (defaults to betting.edge_threshold)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Backtest selected value bets with flat 1-unit stakes
    Backtest {
        #[arg(short, long, default_value = "data/high_value_bets_with_labels.csv")]
        input: PathBuf,

        /// Per-bet results with cumulative profit
        #[arg(long, default_value = "data/backtest_results_detailed.csv")]
        detail_output: PathBuf,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Build the race history CSV from HKJC result workbooks
    BuildDataset {
        /// Directory searched recursively for .xlsx files
        #[arg(long, default_value = "data/raw")]
        raw_dir: PathBuf,

        #[arg(short, long, default_value = "data/historical_races.csv")]
        output: PathBuf,
    },

    /// Fill missing win odds on a race card CSV
    FillOdds {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Defaults to <stem>_with_odds.<ext> next to the input
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Clean numeric columns of a race card CSV
    Clean {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Defaults to <stem>_cleaned.<ext> next to the input
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Generate a synthetic race history
    Simulate {
        #[arg(short, long, default_value = "data/historical_races.csv")]
        output: PathBuf,

        #[arg(long, default_value_t = 200)]
        races: usize,

        #[arg(long, default_value_t = 12)]
        horses: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Also write jockey/trainer encoders for the simulated names here
        #[arg(long)]
        encoders_dir: Option<PathBuf>,
    },

    /// Show saved predictions
    History {
        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

fn load_encoder(path: &str) -> Option<LabelEncoder> {
    match LabelEncoder::from_file(path) {
        Ok(enc) => Some(enc),
        Err(e) => {
            eprintln!("Warning: {:#}; names will encode as unknown", e);
            None
        }
    }
}

fn predictions_frame(rows: &[PredictionRow]) -> anyhow::Result<DataFrame> {
    let text = |f: fn(&PredictionRow) -> &str| -> Vec<String> {
        rows.iter().map(|r| f(r).to_string()).collect()
    };
    let num = |f: fn(&PredictionRow) -> f64| -> Vec<f64> { rows.iter().map(f).collect() };

    Ok(DataFrame::new(vec![
        Column::new("horse_name".into(), text(|r| r.horse_name.as_str())),
        Column::new("jockey".into(), text(|r| r.jockey.as_str())),
        Column::new("trainer".into(), text(|r| r.trainer.as_str())),
        Column::new("win_odds".into(), num(|r| r.win_odds)),
        Column::new("predicted_top3_prob".into(), num(|r| r.predicted_top3_prob)),
        Column::new("implied_probability".into(), num(|r| r.implied_probability)),
        Column::new("value_score".into(), num(|r| r.value_score)),
        Column::new("kelly_fraction".into(), num(|r| r.kelly_fraction)),
    ])?)
}

/// Run CLI prediction from a race card file.
pub fn run_predict(
    input: PathBuf,
    format: String,
    output: Option<PathBuf>,
    model_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;

    if let Some(path) = model_path {
        config.model.path = path.to_string_lossy().to_string();
    }

    eprintln!("Loading model from: {}", config.model.path);
    let model = load_model(&config.model.path)?;
    eprintln!("Model loaded successfully ({})", model.kind());

    let jockeys = load_encoder(&config.model.jockey_encoder);
    let trainers = load_encoder(&config.model.trainer_encoder);

    let bytes =
        std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let entries = parse_race_card(&bytes)?;
    eprintln!("Horses: {}", entries.len());

    let predictions = predict_entries(
        &entries,
        Some(&*model),
        Encoders {
            jockey: jockeys.as_ref(),
            trainer: trainers.as_ref(),
        },
        &config.betting,
    )?;

    if let Some(path) = output {
        table::write_csv(&mut predictions_frame(&predictions)?, &path)?;
        eprintln!("Predictions written to: {}", path.display());
    }

    let response = PredictResponse { predictions };
    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        "table" => {
            print_table(&response.predictions);
        }
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

/// Print predictions sorted by value score.
fn print_table(rows: &[PredictionRow]) {
    let mut sorted: Vec<_> = rows.iter().collect();
    sorted.sort_by(|a, b| b.value_score.total_cmp(&a.value_score));

    println!("=== Predictions (by value score) ===");
    println!(
        "  {:16} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "Horse", "Odds", "Top3", "Implied", "Value", "Kelly"
    );
    println!("  {}", "-".repeat(64));
    for r in sorted {
        println!(
            "  {:16} {:>8.2} {:>7.1}% {:>7.1}% {:>+8.4} {:>7.1}%",
            r.horse_name,
            r.win_odds,
            r.predicted_top3_prob * 100.0,
            r.implied_probability * 100.0,
            r.value_score,
            r.kelly_fraction * 100.0
        );
    }
}

pub fn run_value_bets(input: PathBuf, output: PathBuf, threshold: Option<f64>) -> anyhow::Result<()> {
    if !input.exists() {
        bail!(
            "{} does not exist; run `predict --output {}` first",
            input.display(),
            input.display()
        );
    }
    let threshold = match threshold {
        Some(t) => t,
        None => AppConfig::load()?.betting.edge_threshold,
    };

    let df = table::read_csv_file(&input)?;
    eprintln!("Loaded {} predictions", df.height());

    let mut bets = value_bets_frame(&df, threshold)?;
    table::write_csv(&mut bets, &output)?;
    println!(
        "{} value bets (edge > {}) written to {}",
        bets.height(),
        threshold,
        output.display()
    );
    Ok(())
}

pub fn run_features(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    eprintln!("Reading history: {}", input.display());
    let df = table::read_csv_file(&input)?;

    eprintln!("Computing form features...");
    let mut out = add_historical_features(&df)?;
    table::write_csv(&mut out, &output)?;
    println!("Features written to: {}", output.display());
    Ok(())
}

pub fn run_select_bets(
    history: PathBuf,
    predictions: PathBuf,
    output: PathBuf,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    let threshold = match threshold {
        Some(t) => t,
        None => AppConfig::load()?.betting.edge_threshold,
    };

    let hist = table::read_csv_file(&history)?;
    let preds = table::read_csv_file(&predictions)?;
    eprintln!("History rows: {}", hist.height());

    let mut selected = select_high_value_bets(&hist, &preds, threshold)?;
    eprintln!("High-value bets: {}", selected.height());
    if selected.height() == 0 {
        println!("No bets with edge above {}", threshold);
        return Ok(());
    }

    table::write_csv(&mut selected, &output)?;
    eprintln!("Saved labelled bets to: {}", output.display());

    let (bets, _) = load_bets(&selected)?;
    let results = BacktestResults::new(bets);
    println!("Hit Rate:  {:.2}%", results.hit_rate() * 100.0);
    println!("Avg Odds:  {:.2}", results.avg_odds());
    println!("Profit:    {:.2}", results.profit());
    println!("ROI:       {:.2}%", results.roi());
    Ok(())
}

pub fn run_backtest(input: PathBuf, detail_output: PathBuf, format: String) -> anyhow::Result<()> {
    if !input.exists() {
        bail!(
            "{} does not exist; run `select-bets` first",
            input.display()
        );
    }

    let df = table::read_csv_file(&input)?;
    eprintln!("Backtest rows: {}", df.height());
    if df.height() == 0 {
        println!("Nothing to backtest");
        return Ok(());
    }

    let (bets, rows) = load_bets(&df)?;
    if bets.is_empty() {
        println!("Nothing to backtest");
        return Ok(());
    }
    let results = BacktestResults::new(bets);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&results.summary())?),
        _ => print_backtest_table(&results),
    }

    let mut detail = detail_frame(&df, &rows, &results)?;
    table::write_csv(&mut detail, &detail_output)?;
    eprintln!("Detailed results written to: {}", detail_output.display());
    Ok(())
}

pub fn run_clean(input: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    if !input.exists() {
        bail!("File not found: {}", input.display());
    }

    let summary = clean_race_csv(&input, output.as_deref())?;
    eprintln!("Dropped {} invalid rows", summary.dropped_rows());
    println!(
        "{} valid rows written to {}",
        summary.kept_rows,
        summary.output.display()
    );
    Ok(())
}

pub fn run_build_dataset(raw_dir: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let summary = build_dataset(&raw_dir, &output)?;
    for (path, reason) in &summary.skipped {
        eprintln!("Skipped {}: {}", path.display(), reason);
    }
    eprintln!(
        "Read {} races from {} workbooks",
        summary.races, summary.workbooks
    );
    println!(
        "{} results written to {} (top-3 rate {:.2}%)",
        summary.rows,
        summary.output.display(),
        summary.top3_rate * 100.0
    );
    Ok(())
}

pub fn run_fill_odds(input: PathBuf, output: Option<PathBuf>, seed: u64) -> anyhow::Result<()> {
    if !input.exists() {
        bail!("File not found: {}", input.display());
    }

    let summary = fill_odds(&input, output.as_deref(), seed)?;
    println!(
        "Filled odds for {} of {} horses, written to {}",
        summary.filled,
        summary.rows,
        summary.output.display()
    );
    Ok(())
}

pub fn run_simulate(
    output: PathBuf,
    races: usize,
    horses: usize,
    seed: u64,
    encoders_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = SimulationConfig {
        races,
        horses_per_race: horses,
        seed,
        ..SimulationConfig::default()
    };

    let runners = simulate::generate(&config)?;
    let mut df = simulate::to_frame(&runners)?;
    table::write_csv(&mut df, &output)?;

    let top3 = runners.iter().filter(|r| r.is_top3).count();
    println!("Generated {} records in {}", runners.len(), output.display());
    if !runners.is_empty() {
        println!(
            "Top-3 rate: {:.2}%",
            top3 as f64 / runners.len() as f64 * 100.0
        );
    }

    if let Some(dir) = encoders_dir {
        write_encoders(&dir)?;
    }
    Ok(())
}

fn write_encoders(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let (jockeys, trainers) = simulate::encoders();
    jockeys.to_file(dir.join("jockey_encoder.json"))?;
    trainers.to_file(dir.join("trainer_encoder.json"))?;
    eprintln!("Encoders written to: {}", dir.display());
    Ok(())
}

pub fn run_history(format: String) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let repo = PredictionRepository::new(Path::new(&config.history.db_path))?;
    let records = repo.get_all_predictions()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("=== Prediction History ({} rows) ===", records.len());
    println!(
        "  {:>5} {:10} {:16} {:>8} {:>8} {:>8} {:>9}",
        "ID", "Date", "Horse", "Odds", "Top3", "Value", "Result"
    );
    println!("  {}", "-".repeat(72));
    for r in &records {
        println!(
            "  {:>5} {:10} {:16} {:>8.2} {:>7.1}% {:>+8.4} {:>9}",
            r.id,
            r.race_date,
            r.horse_name,
            r.win_odds.unwrap_or(f64::NAN),
            r.predicted_top3_prob.unwrap_or(f64::NAN) * 100.0,
            r.value_score.unwrap_or(f64::NAN),
            r.actual_result
        );
    }
    Ok(())
}
