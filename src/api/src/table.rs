//! Thin helpers over polars for the CSV pipelines.
//!
//! Cells are read leniently: numeric columns are cast non-strictly, so
//! anything unparsable becomes a missing value instead of an error.

use anyhow::{Context, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Drop a leading UTF-8 byte order mark.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Parse CSV (with header) from memory.
pub fn read_csv_bytes(bytes: Vec<u8>) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
}

/// Read a UTF-8 CSV file from disk.
pub fn read_csv_file(path: &Path) -> Result<DataFrame> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let df = read_csv_bytes(strip_bom(&bytes).to_vec())
        .with_context(|| format!("Failed to parse CSV {}", path.display()))?;
    Ok(df)
}

/// Write a frame as CSV with header.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Required columns absent from the frame, in the order given.
pub fn missing_columns(df: &DataFrame, required: &[&str]) -> Vec<String> {
    let names = column_names(df);
    required
        .iter()
        .filter(|c| !names.iter().any(|n| n == *c))
        .map(|c| c.to_string())
        .collect()
}

/// Trim header whitespace and rename known aliases to canonical names.
///
/// An alias is skipped when the canonical column already exists.
pub fn normalize_headers(df: &mut DataFrame, aliases: &[(&str, &str)]) -> PolarsResult<()> {
    for name in column_names(df) {
        let trimmed = name.trim();
        let target = aliases
            .iter()
            .find(|(alias, _)| *alias == trimmed)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(trimmed);

        if target != name && !column_names(df).iter().any(|n| n == target) {
            df.rename(&name, target.into())?;
        }
    }
    Ok(())
}

/// Column as optional strings (any dtype is rendered to text).
pub fn string_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let col = df.column(name)?.cast(&DataType::String)?;
    Ok(col
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Column as optional finite floats; unparsable cells become `None`.
pub fn f64_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let col = df.column(name)?.cast(&DataType::Float64)?;
    Ok(col
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Reorder or subset rows by position.
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> PolarsResult<DataFrame> {
    let idx: Vec<IdxSize> = rows.iter().map(|&i| i as IdxSize).collect();
    df.take(&IdxCa::from_vec("idx".into(), idx))
}

/// Keep rows where `mask` is true.
pub fn filter_rows(df: &DataFrame, mask: &[bool]) -> PolarsResult<DataFrame> {
    df.filter(&BooleanChunked::from_slice("mask".into(), mask))
}

/// Replace or append a float column.
pub fn set_f64_column(df: &mut DataFrame, name: &str, values: Vec<Option<f64>>) -> PolarsResult<()> {
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}

/// Replace or append a text column.
pub fn set_str_column(df: &mut DataFrame, name: &str, values: Vec<String>) -> PolarsResult<()> {
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}
