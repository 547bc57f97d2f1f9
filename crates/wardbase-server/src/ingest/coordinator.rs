//! Pipeline coordinator
//!
//! Owns one ingestion run end to end:
//! 1. Starting: read the header on the caller's task
//! 2. Streaming: producer and worker pool run concurrently
//! 3. Draining: producer finished, workers flush what is left
//! 4. Done, or Failed on a header or connection error

use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::PipelineConfig;
use super::error::IngestError;
use super::source::RecordSource;
use super::types::{IngestSummary, PipelineState};
use super::worker::{BatchWorker, BufferGauge, SharedReceiver};
use super::writer::{BatchWriter, PgBatchWriter};

/// Runs CSV streams through the producer, channel and worker pool
#[derive(Clone)]
pub struct PipelineCoordinator {
    writer: Arc<dyn BatchWriter>,
    config: PipelineConfig,
}

impl PipelineCoordinator {
    pub fn new(writer: Arc<dyn BatchWriter>, config: PipelineConfig) -> Self {
        Self { writer, config }
    }

    /// Coordinator writing into PostgreSQL through `pool`
    pub fn postgres(pool: PgPool, config: PipelineConfig) -> wardbase_common::Result<Self> {
        config.validate()?;
        let writer = PgBatchWriter::new(pool, &config.table)?;
        Ok(Self::new(Arc::new(writer), config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest one CSV stream.
    ///
    /// Returns once every worker has exited. Batch failures are reported in
    /// the summary; only a bad header or a lost database connection fails
    /// the run. Batches committed before a failure stay committed.
    pub async fn run<R>(&self, input: R) -> Result<IngestSummary, IngestError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let started_at = Utc::now();
        let mut state = PipelineState::Starting;
        tracing::info!(
            %run_id,
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            table = %self.config.table,
            "Starting CSV ingest"
        );

        let mut source = RecordSource::new(input);
        let header = match source.read_header().await {
            Ok(header) => header,
            Err(e) => {
                transition(run_id, &mut state, PipelineState::Failed);
                tracing::error!(%run_id, error = %e, "CSV header rejected");
                return Err(e);
            },
        };
        tracing::debug!(%run_id, columns = ?header, "Header consumed");

        let (tx, rx) = mpsc::channel(self.config.channel_capacity());
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        transition(run_id, &mut state, PipelineState::Streaming);
        let producer = tokio::spawn(source.run(tx, cancel.clone()));

        let gauge = Arc::new(BufferGauge::new());
        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let worker = BatchWorker::new(
                worker_id,
                rx.clone(),
                self.writer.clone(),
                gauge.clone(),
                &self.config,
            );
            workers.spawn(worker.run(cancel.clone()));
        }
        // Workers hold the only receivers; the producer sees a closed
        // channel if they all exit
        drop(rx);

        let mut fatal: Option<IngestError> = None;

        let source_report = match producer.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(%run_id, error = %e, "Record source task failed");
                cancel.cancel();
                fatal = Some(IngestError::Task(e));
                Default::default()
            },
        };

        if fatal.is_none() {
            transition(run_id, &mut state, PipelineState::Draining);
        }

        let mut summary = IngestSummary::new(run_id, started_at, source_report);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(report)) => summary.absorb(report),
                Ok(Err(e)) => {
                    cancel.cancel();
                    fatal.get_or_insert(e);
                },
                Err(e) => {
                    tracing::error!(%run_id, error = %e, "Worker task failed");
                    cancel.cancel();
                    fatal.get_or_insert(IngestError::Task(e));
                },
            }
        }

        summary.peak_buffered_rows = gauge.peak() as u64;
        summary.finished_at = Utc::now();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(e) = fatal {
            transition(run_id, &mut state, PipelineState::Failed);
            tracing::error!(
                %run_id,
                error = %e,
                rows_committed = summary.rows_committed,
                batches_committed = summary.batches_committed,
                "CSV ingest failed"
            );
            return Err(e);
        }

        transition(run_id, &mut state, PipelineState::Done);
        tracing::info!(
            %run_id,
            rows_received = summary.rows_received,
            rows_committed = summary.rows_committed,
            batches_committed = summary.batches_committed,
            batches_failed = summary.batches_failed,
            rows_skipped = summary.rows_skipped,
            truncated = summary.stream_truncated,
            elapsed_ms = summary.elapsed_ms,
            "CSV ingest complete"
        );
        Ok(summary)
    }
}

fn transition(run_id: Uuid, state: &mut PipelineState, next: PipelineState) {
    debug_assert!(state.can_transition_to(next), "invalid transition {} -> {}", state, next);
    tracing::debug!(%run_id, from = %state, to = %next, "Pipeline state changed");
    *state = next;
}
