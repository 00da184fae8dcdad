//! Race history built from HKJC result workbooks.
//!
//! Each sheet of a workbook holds one race. Sheets without the result columns
//! are skipped. The race date is the 8-digit date in the file name, as in
//! `HKJ_local_results_20230910.xlsx`.

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::clean::clean_number;
use crate::race_card::COLUMN_ALIASES;
use crate::table;

/// Columns a sheet needs before its rows are used.
pub const RESULT_COLUMNS: [&str; 7] = [
    "finish_position",
    "horse_name",
    "jockey",
    "trainer",
    "actual_weight",
    "draw",
    "win_odds",
];

/// One finisher of one race.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub race_date: NaiveDate,
    pub race_id: String,
    pub horse_name: String,
    pub jockey: String,
    pub trainer: String,
    pub actual_weight: Option<f64>,
    pub draw: Option<f64>,
    pub win_odds: Option<f64>,
    pub finish_position: u32,
}

impl ResultRow {
    pub fn is_top3(&self) -> bool {
        self.finish_position <= 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub workbooks: usize,
    pub races: usize,
    pub rows: usize,
    pub top3_rate: f64,
    pub skipped: Vec<(PathBuf, String)>,
    pub output: PathBuf,
}

/// First 8-digit run in the file stem, read as `%Y%m%d`.
pub fn race_date_from_file_name(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_string_lossy();
    stem.split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 8)
        .find_map(|token| NaiveDate::parse_from_str(token, "%Y%m%d").ok())
}

/// Leading number of a placing such as `3` or `1 DH`; withdrawals give `None`.
pub fn finish_position(raw: &str) -> Option<u32> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|&p| p > 0)
}

/// Workbook headers are often split over lines ("實際\n負磅").
fn canonical_header(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == collapsed)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(collapsed)
}

/// Rows of one sheet, first row as header. `None` when result columns are missing.
pub fn parse_sheet(rows: &[Vec<String>], race_date: NaiveDate, race_id: &str) -> Option<Vec<ResultRow>> {
    let header: Vec<String> = rows.first()?.iter().map(|h| canonical_header(h)).collect();
    let index = |name: &str| header.iter().position(|h| h == name);

    let mut idx = [0usize; RESULT_COLUMNS.len()];
    for (slot, name) in idx.iter_mut().zip(RESULT_COLUMNS) {
        *slot = index(name)?;
    }
    let [pos, name, jockey, trainer, weight, draw, odds] = idx;

    let results = rows[1..]
        .iter()
        .filter_map(|row| {
            let cell = |i: usize| row.get(i).map(|c| c.trim()).unwrap_or("");
            let horse_name = cell(name);
            if horse_name.is_empty() {
                return None;
            }
            Some(ResultRow {
                race_date,
                race_id: race_id.to_string(),
                horse_name: horse_name.to_string(),
                jockey: cell(jockey).to_string(),
                trainer: cell(trainer).to_string(),
                actual_weight: clean_number(cell(weight)),
                draw: clean_number(cell(draw)),
                win_odds: clean_number(cell(odds)),
                finish_position: finish_position(cell(pos))?,
            })
        })
        .collect();

    Some(results)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        other => other.to_string(),
    }
}

/// Every race sheet of one workbook.
pub fn read_workbook(path: &Path) -> Result<Vec<ResultRow>> {
    let race_date = race_date_from_file_name(path)
        .with_context(|| format!("No YYYYMMDD date in file name {}", path.display()))?;
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut results = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&sheet) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!("Skipping sheet {} of {}: {}", sheet, path.display(), e);
                continue;
            }
        };
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let race_id = format!("{}_{}", race_date.format("%Y%m%d"), sheet);
        match parse_sheet(&rows, race_date, &race_id) {
            Some(rows) => results.extend(rows),
            None => tracing::debug!("Sheet {} has no result columns", sheet),
        }
    }
    Ok(results)
}

/// `.xlsx`/`.xls` files under `dir`, sorted; Excel lock files are ignored.
pub fn find_workbooks(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            let is_excel = p
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls"))
                .unwrap_or(false);
            let is_lock = p
                .file_name()
                .map(|n| n.to_string_lossy().starts_with("~$"))
                .unwrap_or(false);
            is_excel && !is_lock
        })
        .collect();
    files.sort();
    files
}

/// History frame in the layout `features` reads.
pub fn rows_to_frame(rows: &[ResultRow]) -> Result<DataFrame> {
    let text = |f: fn(&ResultRow) -> String| -> Vec<String> { rows.iter().map(f).collect() };
    let num = |f: fn(&ResultRow) -> Option<f64>| -> Vec<Option<f64>> { rows.iter().map(f).collect() };

    Ok(DataFrame::new(vec![
        Column::new(
            "race_date".into(),
            text(|r| r.race_date.format("%Y-%m-%d").to_string()),
        ),
        Column::new("race_id".into(), text(|r| r.race_id.clone())),
        Column::new("horse_name".into(), text(|r| r.horse_name.clone())),
        Column::new("jockey".into(), text(|r| r.jockey.clone())),
        Column::new("trainer".into(), text(|r| r.trainer.clone())),
        Column::new("actual_weight".into(), num(|r| r.actual_weight)),
        Column::new("draw".into(), num(|r| r.draw)),
        Column::new("win_odds".into(), num(|r| r.win_odds)),
        Column::new(
            "finish_position".into(),
            rows.iter().map(|r| r.finish_position as i64).collect::<Vec<i64>>(),
        ),
        Column::new(
            "is_top3".into(),
            rows.iter().map(|r| r.is_top3() as i64).collect::<Vec<i64>>(),
        ),
    ])?)
}

/// Read every workbook under `raw_dir` and write one history CSV.
pub fn build_dataset(raw_dir: &Path, output: &Path) -> Result<DatasetSummary> {
    if !raw_dir.is_dir() {
        bail!("{} is not a directory", raw_dir.display());
    }
    let workbooks = find_workbooks(raw_dir);
    if workbooks.is_empty() {
        bail!("No .xlsx workbooks found under {}", raw_dir.display());
    }

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for path in &workbooks {
        match read_workbook(path) {
            Ok(found) => rows.extend(found),
            Err(e) => skipped.push((path.clone(), format!("{:#}", e))),
        }
    }
    if rows.is_empty() {
        bail!("No race results found in {} workbooks", workbooks.len());
    }

    let races = rows.iter().map(|r| r.race_id.as_str()).collect::<HashSet<_>>().len();
    let top3 = rows.iter().filter(|r| r.is_top3()).count();

    let mut df = rows_to_frame(&rows)?;
    table::write_csv(&mut df, output)?;

    Ok(DatasetSummary {
        workbooks: workbooks.len(),
        races,
        rows: rows.len(),
        top3_rate: top3 as f64 / rows.len() as f64,
        skipped,
        output: output.to_path_buf(),
    })
}
