use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Per-province lower-chamber seat budgets. Static reference data loaded from
/// a JSON file and injected into the aggregation engine, kept out of the
/// allocation algorithm itself so reapportionment never touches code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeatsTable {
    /// Province code -> total lower-chamber seats.
    pub seats: HashMap<String, u32>,
}

impl SeatsTable {
    pub fn from_file(path: &Path) -> Result<SeatsTable, SeatsTableError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SeatsTableError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let table = serde_json::from_str(&raw)?;
        Ok(table)
    }

    /// Seat budget for a province; unknown provinces get 0 seats and an
    /// all-zero allocation downstream.
    pub fn seats_for(&self, province_code: &str) -> u32 {
        self.seats.get(province_code).copied().unwrap_or(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeatsTableError {
    #[error("failed to read seats table {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed seats table: {0}")]
    Parse(#[from] serde_json::Error),
}
