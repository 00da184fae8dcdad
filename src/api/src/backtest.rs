//! Backtesting of value bets on labelled history.
//!
//! Two steps: select the high-value bets from the race history joined with
//! model probabilities, then replay them with flat 1-unit stakes.

use anyhow::{bail, Result};
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::betting::{edge, expected_profit, implied_probability};
use crate::table;

/// Odds above this count as long shots in the odds breakdown.
pub const HIGH_ODDS: f64 = 10.0;

const HISTORY_REQUIRED: [&str; 2] = ["win_odds", "is_top3"];
const BETS_REQUIRED: [&str; 4] = ["is_top3", "win_odds", "edge", "predicted_top3_prob"];

/// Join history and predictions row by row and keep bets with `edge > threshold`.
///
/// Rows are paired by position; the longer frame is truncated. Adds
/// `predicted_top3_prob`, `implied_prob`, `edge` and `expected_return`.
pub fn select_high_value_bets(
    history: &DataFrame,
    predictions: &DataFrame,
    threshold: f64,
) -> Result<DataFrame> {
    let missing = table::missing_columns(history, &HISTORY_REQUIRED);
    if !missing.is_empty() {
        bail!("History is missing required columns: {:?}", missing);
    }
    if !table::column_names(predictions).iter().any(|c| c == "predicted_top3_prob") {
        bail!("Predictions are missing the predicted_top3_prob column");
    }

    let n = history.height().min(predictions.height());
    let mut joined = history.head(Some(n));
    let probs: Vec<Option<f64>> = table::f64_column(predictions, "predicted_top3_prob")?
        .into_iter()
        .take(n)
        .collect();
    let odds = table::f64_column(&joined, "win_odds")?;

    let mut implied = Vec::with_capacity(n);
    let mut edges = Vec::with_capacity(n);
    let mut returns = Vec::with_capacity(n);
    for (o, p) in odds.iter().zip(&probs) {
        match (o, p) {
            (Some(o), Some(p)) if *o != 0.0 => {
                implied.push(Some(implied_probability(*o)));
                edges.push(Some(edge(*p, *o)));
                returns.push(Some(expected_profit(*p, *o)));
            }
            _ => {
                implied.push(None);
                edges.push(None);
                returns.push(None);
            }
        }
    }

    let keep: Vec<bool> = edges
        .iter()
        .map(|e| e.is_some_and(|e| e > threshold))
        .collect();

    table::set_f64_column(&mut joined, "predicted_top3_prob", probs)?;
    table::set_f64_column(&mut joined, "implied_prob", implied)?;
    table::set_f64_column(&mut joined, "edge", edges)?;
    table::set_f64_column(&mut joined, "expected_return", returns)?;

    Ok(table::filter_rows(&joined, &keep)?)
}

/// A single settled 1-unit bet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetResult {
    pub win_odds: f64,
    pub edge: f64,
    pub predicted_top3_prob: f64,
    pub is_top3: bool,
}

impl BetResult {
    pub fn profit(&self) -> f64 {
        if self.is_top3 {
            self.win_odds - 1.0
        } else {
            -1.0
        }
    }
}

/// Read bets from a frame; rows with any non-numeric required cell are skipped.
///
/// Also returns the positions of the rows that were kept.
pub fn load_bets(df: &DataFrame) -> Result<(Vec<BetResult>, Vec<usize>)> {
    let missing = table::missing_columns(df, &BETS_REQUIRED);
    if !missing.is_empty() {
        bail!("Missing required columns: {:?}", missing);
    }

    let top3 = table::f64_column(df, "is_top3")?;
    let odds = table::f64_column(df, "win_odds")?;
    let edges = table::f64_column(df, "edge")?;
    let probs = table::f64_column(df, "predicted_top3_prob")?;

    let mut bets = Vec::new();
    let mut rows = Vec::new();
    for i in 0..df.height() {
        if let (Some(t), Some(o), Some(e), Some(p)) = (top3[i], odds[i], edges[i], probs[i]) {
            bets.push(BetResult {
                win_odds: o,
                edge: e,
                predicted_top3_prob: p,
                is_top3: t == 1.0,
            });
            rows.push(i);
        }
    }
    Ok((bets, rows))
}

/// Hit rate and ROI of a subset of bets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketStats {
    pub num_bets: usize,
    pub hit_rate: f64,
    pub roi: f64,
}

impl BucketStats {
    fn from_bets<'a, I: IntoIterator<Item = &'a BetResult>>(bets: I) -> Self {
        let (n, hits, profit) = bets.into_iter().fold((0usize, 0usize, 0.0), |(n, h, p), b| {
            (n + 1, h + b.is_top3 as usize, p + b.profit())
        });
        Self {
            num_bets: n,
            hit_rate: if n > 0 { hits as f64 / n as f64 } else { 0.0 },
            roi: if n > 0 { profit / n as f64 * 100.0 } else { 0.0 },
        }
    }
}

/// Results of a flat-stake replay, in bet order.
#[derive(Debug, Clone, Default)]
pub struct BacktestResults {
    pub bets: Vec<BetResult>,
}

impl BacktestResults {
    pub fn new(bets: Vec<BetResult>) -> Self {
        Self { bets }
    }

    pub fn num_bets(&self) -> usize {
        self.bets.len()
    }

    pub fn num_hits(&self) -> usize {
        self.bets.iter().filter(|b| b.is_top3).count()
    }

    pub fn total_stake(&self) -> f64 {
        self.bets.len() as f64
    }

    pub fn profit(&self) -> f64 {
        self.bets.iter().map(BetResult::profit).sum()
    }

    /// Return on investment in percent.
    pub fn roi(&self) -> f64 {
        if self.bets.is_empty() {
            return 0.0;
        }
        self.profit() / self.total_stake() * 100.0
    }

    pub fn hit_rate(&self) -> f64 {
        if self.bets.is_empty() {
            return 0.0;
        }
        self.num_hits() as f64 / self.num_bets() as f64
    }

    fn mean_of(&self, f: impl Fn(&BetResult) -> f64) -> f64 {
        if self.bets.is_empty() {
            return 0.0;
        }
        self.bets.iter().map(f).sum::<f64>() / self.num_bets() as f64
    }

    pub fn avg_edge(&self) -> f64 {
        self.mean_of(|b| b.edge)
    }

    pub fn avg_odds(&self) -> f64 {
        self.mean_of(|b| b.win_odds)
    }

    pub fn median_odds(&self) -> f64 {
        let mut odds: Vec<f64> = self.bets.iter().map(|b| b.win_odds).collect();
        if odds.is_empty() {
            return 0.0;
        }
        odds.sort_by(|a, b| a.total_cmp(b));
        let mid = odds.len() / 2;
        if odds.len() % 2 == 0 {
            (odds[mid - 1] + odds[mid]) / 2.0
        } else {
            odds[mid]
        }
    }

    pub fn cumulative_profit(&self) -> Vec<f64> {
        self.bets
            .iter()
            .scan(0.0, |acc, b| {
                *acc += b.profit();
                Some(*acc)
            })
            .collect()
    }

    /// Cumulative profit per unit staked so far, in percent.
    pub fn cumulative_return(&self) -> Vec<f64> {
        self.cumulative_profit()
            .into_iter()
            .enumerate()
            .map(|(i, p)| p / (i + 1) as f64 * 100.0)
            .collect()
    }

    /// Largest relative fall of the bankroll from its running peak (<= 0).
    ///
    /// The bankroll starts at the total stake, so it stays non-negative.
    pub fn max_drawdown(&self) -> f64 {
        let stake = self.total_stake();
        let mut peak = f64::NEG_INFINITY;
        let mut max_dd: f64 = 0.0;

        for cum in self.cumulative_profit() {
            let equity = cum + stake;
            peak = peak.max(equity);
            if peak > 0.0 {
                max_dd = max_dd.min((equity - peak) / peak);
            }
        }
        max_dd
    }

    /// Mean over sample standard deviation of per-bet profit.
    pub fn sharpe_ratio(&self) -> f64 {
        let n = self.bets.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.profit() / n as f64;
        let var = self
            .bets
            .iter()
            .map(|b| (b.profit() - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        let std = var.sqrt();
        if std == 0.0 {
            0.0
        } else {
            mean / std
        }
    }

    /// Long-shot vs short-price breakdown, only when both sides have bets.
    pub fn odds_breakdown(&self) -> Option<(BucketStats, BucketStats)> {
        let high = BucketStats::from_bets(self.bets.iter().filter(|b| b.win_odds > HIGH_ODDS));
        let low = BucketStats::from_bets(self.bets.iter().filter(|b| b.win_odds <= HIGH_ODDS));
        (high.num_bets > 0 && low.num_bets > 0).then_some((high, low))
    }

    pub fn summary(&self) -> BacktestSummary {
        BacktestSummary {
            num_bets: self.num_bets(),
            num_hits: self.num_hits(),
            hit_rate: self.hit_rate(),
            avg_edge: self.avg_edge(),
            avg_odds: self.avg_odds(),
            median_odds: self.median_odds(),
            total_profit: self.profit(),
            roi: self.roi(),
            sharpe_ratio: self.sharpe_ratio(),
            max_drawdown: self.max_drawdown(),
            high_odds: self.odds_breakdown().map(|(h, _)| h),
            low_odds: self.odds_breakdown().map(|(_, l)| l),
        }
    }
}

/// Serializable backtest report.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestSummary {
    pub num_bets: usize,
    pub num_hits: usize,
    pub hit_rate: f64,
    pub avg_edge: f64,
    pub avg_odds: f64,
    pub median_odds: f64,
    pub total_profit: f64,
    pub roi: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_odds: Option<BucketStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_odds: Option<BucketStats>,
}

/// Append per-bet `profit`, `cumulative_profit` and `cumulative_return` columns.
pub fn detail_frame(df: &DataFrame, rows: &[usize], results: &BacktestResults) -> Result<DataFrame> {
    let mut out = table::take_rows(df, rows)?;
    table::set_f64_column(
        &mut out,
        "profit",
        results.bets.iter().map(|b| Some(b.profit())).collect(),
    )?;
    table::set_f64_column(
        &mut out,
        "cumulative_profit",
        results.cumulative_profit().into_iter().map(Some).collect(),
    )?;
    table::set_f64_column(
        &mut out,
        "cumulative_return",
        results.cumulative_return().into_iter().map(Some).collect(),
    )?;
    Ok(out)
}

/// Print backtest results in table format.
pub fn print_backtest_table(results: &BacktestResults) {
    println!("=== Value Bet Backtest ===");
    println!();
    println!("  Total Bets:    {}", results.num_bets());
    println!("  Hit Rate:      {:.2}%", results.hit_rate() * 100.0);
    println!("  Avg Edge:      {:.2}%", results.avg_edge() * 100.0);
    println!("  Avg Odds:      {:.2}", results.avg_odds());
    println!("  Median Odds:   {:.2}", results.median_odds());
    println!("  {}", "-".repeat(40));
    println!("  Total Profit:  {:.2}", results.profit());
    println!("  ROI:           {:.2}%", results.roi());
    println!("  Sharpe Ratio:  {:.2}", results.sharpe_ratio());
    println!("  Max Drawdown:  {:.2}%", results.max_drawdown() * 100.0);
    println!();
    println!(
        "  Positive expectation: {}",
        if results.roi() > 0.0 { "yes" } else { "no" }
    );

    if let Some((high, low)) = results.odds_breakdown() {
        println!();
        println!("Odds Breakdown:");
        println!(
            "  {:12} {:>8} {:>10} {:>10}",
            "Odds", "Bets", "Hit Rate", "ROI"
        );
        println!("  {}", "-".repeat(44));
        for (label, stats) in [(format!("> {}", HIGH_ODDS), high), (format!("<= {}", HIGH_ODDS), low)] {
            println!(
                "  {:12} {:>8} {:>9.2}% {:>9.2}%",
                label,
                stats.num_bets,
                stats.hit_rate * 100.0,
                stats.roi
            );
        }
    }
}
