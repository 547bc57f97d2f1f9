//! Ingestion pipeline configuration

use regex::Regex;
use serde::{Deserialize, Serialize};
use wardbase_common::WardbaseError;

/// Default number of concurrent batch workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Default batch threshold; also the distribution channel capacity.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default target table.
pub const DEFAULT_TABLE: &str = "ward";

/// What to do with a data row whose field count is not six
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedRowPolicy {
    /// Let the row reach the writer, which rolls back the whole batch
    #[default]
    FailBatch,
    /// Drop the row before batching and count it
    SkipRow,
}

impl MalformedRowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedRowPolicy::FailBatch => "fail-batch",
            MalformedRowPolicy::SkipRow => "skip-row",
        }
    }
}

impl std::str::FromStr for MalformedRowPolicy {
    type Err = WardbaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-batch" | "fail_batch" => Ok(MalformedRowPolicy::FailBatch),
            "skip-row" | "skip_row" | "skip" => Ok(MalformedRowPolicy::SkipRow),
            other => Err(WardbaseError::Parse(format!(
                "Invalid malformed row policy '{}'. Must be 'fail-batch' or 'skip-row'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MalformedRowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for one ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of worker tasks, and therefore concurrent transactions
    pub workers: usize,
    /// Rows per transaction
    pub batch_size: usize,
    /// Table rows are inserted into
    pub table: String,
    /// Handling of rows with the wrong field count
    pub malformed_rows: MalformedRowPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            table: DEFAULT_TABLE.to_string(),
            malformed_rows: MalformedRowPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from environment variables
    ///
    /// - `INGEST_WORKERS`
    /// - `INGEST_BATCH_SIZE`
    /// - `INGEST_TABLE`
    /// - `INGEST_MALFORMED_ROWS` (`fail-batch` or `skip-row`)
    pub fn from_env() -> anyhow::Result<Self> {
        let malformed_rows = match std::env::var("INGEST_MALFORMED_ROWS") {
            Ok(value) => value.parse()?,
            Err(_) => MalformedRowPolicy::default(),
        };

        let config = Self {
            workers: std::env::var("INGEST_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WORKERS),
            batch_size: std::env::var("INGEST_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            table: std::env::var("INGEST_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string()),
            malformed_rows,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_malformed_rows(mut self, policy: MalformedRowPolicy) -> Self {
        self.malformed_rows = policy;
        self
    }

    /// Capacity of the distribution channel
    pub fn channel_capacity(&self) -> usize {
        self.batch_size
    }

    /// Upper bound on rows held by worker buffers at once
    pub fn max_buffered_rows(&self) -> usize {
        self.workers * self.batch_size
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), WardbaseError> {
        if self.workers == 0 {
            return Err(WardbaseError::Config(
                "INGEST_WORKERS must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(WardbaseError::Config(
                "INGEST_BATCH_SIZE must be greater than 0".to_string(),
            ));
        }
        validate_table_name(&self.table)
    }
}

/// Table names are interpolated into SQL, so only plain (optionally
/// schema-qualified) identifiers are accepted.
pub fn validate_table_name(table: &str) -> Result<(), WardbaseError> {
    let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}(\.[A-Za-z_][A-Za-z0-9_]{0,62})?$")
        .map_err(|e| WardbaseError::Config(format!("Invalid table name pattern: {}", e)))?;

    if identifier.is_match(table) {
        Ok(())
    } else {
        Err(WardbaseError::Config(format!(
            "Invalid table name '{}': expected [schema.]identifier",
            table
        )))
    }
}
