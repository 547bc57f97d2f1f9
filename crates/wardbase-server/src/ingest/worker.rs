//! Batch accumulator workers
//!
//! Each worker holds the shared receiver while it fills a batch up to the
//! threshold, releases it, then hands the batch to the writer and waits for
//! the transaction before filling the next one. A partial batch is flushed
//! once when the channel closes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::config::{MalformedRowPolicy, PipelineConfig};
use super::error::IngestError;
use super::types::{Batch, BatchFailure, Row, WorkerReport};
use super::writer::BatchWriter;

/// Receiving end of the distribution channel, shared by all workers
pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<Row>>>;

/// Rows held by accumulators across the whole pool, from receipt until
/// their batch write finishes
#[derive(Debug, Default)]
pub struct BufferGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl BufferGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self, rows: usize) {
        let now = self.current.fetch_add(rows, Ordering::SeqCst) + rows;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn release(&self, rows: usize) {
        self.current.fetch_sub(rows, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// One member of the fixed worker pool
pub struct BatchWorker {
    worker_id: usize,
    rows: SharedReceiver,
    writer: Arc<dyn BatchWriter>,
    gauge: Arc<BufferGauge>,
    batch_size: usize,
    malformed_rows: MalformedRowPolicy,
    buffer: Vec<Row>,
    next_sequence: u64,
    report: WorkerReport,
}

impl BatchWorker {
    pub fn new(
        worker_id: usize,
        rows: SharedReceiver,
        writer: Arc<dyn BatchWriter>,
        gauge: Arc<BufferGauge>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            worker_id,
            rows,
            writer,
            gauge,
            batch_size: config.batch_size,
            malformed_rows: config.malformed_rows,
            buffer: Vec::with_capacity(config.batch_size),
            next_sequence: 0,
            report: WorkerReport::new(worker_id),
        }
    }

    /// Receive rows until the buffer reaches the threshold or the channel
    /// is closed and drained. Returns `true` in the latter case.
    ///
    /// The receiver lock is held for the whole fill, so one batch is made of
    /// consecutive channel rows.
    async fn fill(&mut self) -> bool {
        let rows = self.rows.clone();
        let mut rx = rows.lock().await;

        while self.buffer.len() < self.batch_size {
            let Some(row) = rx.recv().await else {
                return true;
            };
            self.accept(row);
        }
        false
    }

    fn accept(&mut self, row: Row) {
        self.report.rows_received += 1;

        if self.malformed_rows == MalformedRowPolicy::SkipRow && !row.has_expected_shape() {
            tracing::warn!(
                worker_id = self.worker_id,
                line = row.line,
                fields = row.fields.len(),
                "Dropping malformed row"
            );
            self.report.rows_malformed += 1;
            return;
        }

        self.gauge.hold(1);
        self.buffer.push(row);
    }

    /// Worker loop.
    ///
    /// Returns `Err` only for a connection-level failure, after cancelling
    /// the rest of the run. If the run is cancelled by someone else the
    /// unflushed buffer is abandoned and the report so far returned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<WorkerReport, IngestError> {
        tracing::debug!(worker_id = self.worker_id, "Worker started");

        loop {
            let filled = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                closed = self.fill() => Some(closed),
            };

            let Some(closed) = filled else {
                tracing::debug!(
                    worker_id = self.worker_id,
                    abandoned = self.buffer.len(),
                    "Worker cancelled"
                );
                self.gauge.release(self.buffer.len());
                return Ok(self.report);
            };

            if !self.buffer.is_empty() {
                self.flush(&cancel).await?;
            }
            // Closed and drained
            if closed {
                break;
            }
        }

        tracing::debug!(
            worker_id = self.worker_id,
            batches_committed = self.report.batches_committed,
            batches_failed = self.report.failures.len(),
            rows_committed = self.report.rows_committed,
            "Worker finished"
        );
        Ok(self.report)
    }

    async fn flush(&mut self, cancel: &CancellationToken) -> Result<(), IngestError> {
        let rows = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let batch = Batch {
            worker_id: self.worker_id,
            sequence: self.next_sequence,
            rows,
        };
        self.next_sequence += 1;

        let sequence = batch.sequence;
        let batch_rows = batch.len() as u64;
        let first_line = batch.line_span().map(|(first, _)| first);

        let result = self.writer.write_batch(batch).await;
        self.gauge.release(batch_rows as usize);

        match result {
            Ok(receipt) => {
                self.report.batches_committed += 1;
                self.report.rows_committed += receipt.rows_inserted;
                Ok(())
            },
            Err(e) => match e.into_fatal() {
                Ok(fatal) => {
                    tracing::error!(
                        worker_id = self.worker_id,
                        sequence,
                        error = %fatal,
                        "Database connection lost, cancelling ingest"
                    );
                    cancel.cancel();
                    Err(fatal)
                },
                Err(e) => {
                    tracing::warn!(
                        worker_id = self.worker_id,
                        sequence,
                        rows = batch_rows,
                        first_line = ?first_line,
                        error = %e,
                        "Batch rolled back"
                    );
                    self.report.failures.push(BatchFailure {
                        worker_id: self.worker_id,
                        sequence,
                        rows: batch_rows,
                        first_line,
                        error: e.to_string(),
                    });
                    Ok(())
                },
            },
        }
    }
}
