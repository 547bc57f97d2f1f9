//! Core types for the CSV ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wardbase_common::types::{FieldCountError, WardRecord, WARD_FIELD_COUNT};

/// One decoded data row, exactly as the CSV decoder produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line in the source stream
    pub line: u64,
    pub fields: Vec<String>,
}

impl Row {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    pub fn has_expected_shape(&self) -> bool {
        self.fields.len() == WARD_FIELD_COUNT
    }
}

impl TryFrom<Row> for WardRecord {
    type Error = FieldCountError;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        WardRecord::from_fields(row.fields)
    }
}

/// Rows committed together in one transaction
#[derive(Debug, Clone)]
pub struct Batch {
    /// Worker that filled the batch
    pub worker_id: usize,
    /// Per-worker sequence number, starting at 0
    pub sequence: u64,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First and last source lines, for log context
    pub fn line_span(&self) -> Option<(u64, u64)> {
        let first = self.rows.first()?.line;
        let last = self.rows.last()?.line;
        Some((first, last))
    }
}

/// Successful write of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReceipt {
    pub rows_inserted: u64,
}

/// A batch that was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub worker_id: usize,
    pub sequence: u64,
    pub rows: u64,
    pub first_line: Option<u64>,
    pub error: String,
}

/// What the producer task saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceReport {
    /// Rows pushed onto the distribution channel
    pub rows_sent: u64,
    /// Data rows that failed to decode
    pub rows_skipped: u64,
    /// The stream ended on an I/O error rather than a clean EOF
    pub truncated: bool,
}

/// What one worker did before it exited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub rows_received: u64,
    pub rows_committed: u64,
    pub rows_malformed: u64,
    pub batches_committed: u64,
    pub failures: Vec<BatchFailure>,
}

impl WorkerReport {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Self::default()
        }
    }
}

/// Aggregate outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    /// Data rows that made it onto the channel
    pub rows_received: u64,
    pub rows_committed: u64,
    /// Data rows the decoder rejected
    pub rows_skipped: u64,
    /// Rows dropped under the skip-row policy
    pub rows_malformed: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    /// Rows inside rolled back batches
    pub rows_failed: u64,
    pub failed_batches: Vec<BatchFailure>,
    pub stream_truncated: bool,
    /// Most rows held by worker buffers and in-flight batches at once
    pub peak_buffered_rows: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl IngestSummary {
    pub(crate) fn new(run_id: Uuid, started_at: DateTime<Utc>, source: SourceReport) -> Self {
        Self {
            run_id,
            rows_received: source.rows_sent,
            rows_committed: 0,
            rows_skipped: source.rows_skipped,
            rows_malformed: 0,
            batches_committed: 0,
            batches_failed: 0,
            rows_failed: 0,
            failed_batches: Vec::new(),
            stream_truncated: source.truncated,
            peak_buffered_rows: 0,
            started_at,
            finished_at: started_at,
            elapsed_ms: 0,
        }
    }

    pub(crate) fn absorb(&mut self, report: WorkerReport) {
        self.rows_committed += report.rows_committed;
        self.rows_malformed += report.rows_malformed;
        self.batches_committed += report.batches_committed;
        self.batches_failed += report.failures.len() as u64;
        self.rows_failed += report.failures.iter().map(|f| f.rows).sum::<u64>();
        self.failed_batches.extend(report.failures);
    }
}

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Starting,
    Streaming,
    Draining,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Starting => "starting",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (*self, next),
            (Starting, Streaming)
                | (Starting, Failed)
                | (Streaming, Draining)
                | (Streaming, Failed)
                | (Draining, Done)
                | (Draining, Failed)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
