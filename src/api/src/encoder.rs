//! Label encoding for jockey and trainer names.
//!
//! Classes are kept sorted so that a name maps to its index in the sorted
//! class list, the same codes the model was trained with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Code used for names the encoder has never seen.
pub const UNKNOWN_CODE: i64 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Build an encoder from raw values (sorted, deduplicated).
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = values.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Encode a single name; unseen names map to [`UNKNOWN_CODE`].
    pub fn transform(&self, value: &str) -> i64 {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map(|i| i as i64)
            .unwrap_or(UNKNOWN_CODE)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.transform(value) != UNKNOWN_CODE
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Load encoder from JSON file: `{"classes": ["...", ...]}`.
    ///
    /// The class list is re-sorted on load so hand-edited files stay valid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read encoder {}", path.as_ref().display()))?;
        let raw: LabelEncoder = serde_json::from_str(&content)?;
        Ok(Self::fit(raw.classes))
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Encode with an optional encoder; a missing encoder encodes everything as unknown.
pub fn encode(encoder: Option<&LabelEncoder>, value: &str) -> i64 {
    encoder.map_or(UNKNOWN_CODE, |e| e.transform(value))
}
