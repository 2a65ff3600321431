use lazyrow_store::ConsistencyLevel;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Library-wide defaults. Per-record and per-call settings take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Consistency used when neither the call site nor the record names one.
    pub consistency: ConsistencyLevel,
    /// Page size for super column enumeration.
    pub chunk_size: usize,
    /// Column count requested when loading a whole record.
    pub slice_count: usize,
    /// Page size for view key enumeration.
    pub view_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            consistency: ConsistencyLevel::One,
            chunk_size: 10,
            slice_count: 100_000,
            view_chunk_size: 100,
        }
    }
}

impl ClientConfig {
    /// Defaults, overridden by `LAZYROW_CONSISTENCY`, `LAZYROW_CHUNK_SIZE`,
    /// `LAZYROW_SLICE_COUNT` and `LAZYROW_VIEW_CHUNK_SIZE` when set.
    pub fn from_env() -> Result<Self> {
        Self::default().overridden_by(|name| std::env::var(name).ok())
    }

    pub fn overridden_by(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup("LAZYROW_CONSISTENCY") {
            self.consistency = raw
                .parse()
                .map_err(|e| Error::Config(format!("LAZYROW_CONSISTENCY: {e}")))?;
        }
        if let Some(raw) = lookup("LAZYROW_CHUNK_SIZE") {
            self.chunk_size = parse_size("LAZYROW_CHUNK_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("LAZYROW_SLICE_COUNT") {
            self.slice_count = parse_size("LAZYROW_SLICE_COUNT", &raw)?;
        }
        if let Some(raw) = lookup("LAZYROW_VIEW_CHUNK_SIZE") {
            self.view_chunk_size = parse_size("LAZYROW_VIEW_CHUNK_SIZE", &raw)?;
        }
        Ok(self)
    }
}

fn parse_size(name: &str, raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(Error::Config(format!("{name} must be positive"))),
        Ok(n) => Ok(n),
        Err(e) => Err(Error::Config(format!("{name}: {e}"))),
    }
}
