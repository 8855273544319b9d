//! Store configuration.
//!
//! Loaded from JSON by the embedding node; every field has a default so an
//! empty object (`{}`) yields an in-memory store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::limits::MAX_BODY_BYTES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// On-disk database directory. `None` selects the in-memory backend.
    pub db_path: Option<PathBuf>,
    /// Create the database directory if it does not exist.
    pub create_if_missing: bool,
    /// Max CBOR body size accepted by `merge`.
    pub max_body_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            create_if_missing: true,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

impl StoreConfig {
    /// In-memory configuration with defaults.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// On-disk configuration rooted at `path`.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::BadRequest(format!("config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Storage(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}
