//! Test helpers for Wardbase server integration tests
//!
//! This module provides utilities for:
//! - Generating ward CSV documents
//! - An in-memory `BatchWriter` that records every transaction
//! - Byte streams that fail part way through

#![allow(dead_code)]

use async_trait::async_trait;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use wardbase_common::types::WardRecord;
use wardbase_server::ingest::{Batch, BatchReceipt, BatchWriter, Row, WriteError};

pub const HEADER: &str = "district,mandal,village,mp,mla,no_of_wards";

/// Header plus `rows` well-formed rows with distinct values
pub fn ward_csv(rows: usize) -> String {
    let mut out = String::with_capacity(rows * 48 + HEADER.len() + 1);
    out.push_str(HEADER);
    out.push('\n');
    for i in 0..rows {
        out.push_str(&ward_line(i));
        out.push('\n');
    }
    out
}

pub fn ward_line(i: usize) -> String {
    format!("District {i},Mandal {i},Village {i},MP {},MLA {},{}", i % 25, i % 175, i % 40)
}

/// One recorded transaction attempt
#[derive(Debug, Clone)]
pub struct Attempt {
    pub worker_id: usize,
    pub sequence: u64,
    pub lines: Vec<u64>,
    pub committed: bool,
}

/// In-memory writer with the same all-or-nothing behaviour as the
/// PostgreSQL writer
#[derive(Default)]
pub struct RecordingWriter {
    attempts: Mutex<Vec<Attempt>>,
    committed: Mutex<Vec<WardRecord>>,
    attempt_count: AtomicUsize,
    in_flight_rows: AtomicUsize,
    peak_in_flight_rows: AtomicUsize,
    delay: Option<Duration>,
    lose_connection_after: Option<usize>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every transaction open for `delay` so workers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every attempt after the first `batches` with a connection error
    pub fn losing_connection_after(mut self, batches: usize) -> Self {
        self.lose_connection_after = Some(batches);
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn committed_batch_sizes(&self) -> Vec<usize> {
        self.attempts()
            .into_iter()
            .filter(|a| a.committed)
            .map(|a| a.lines.len())
            .collect()
    }

    pub fn committed_rows(&self) -> Vec<WardRecord> {
        self.committed.lock().unwrap().clone()
    }

    pub fn peak_in_flight_rows(&self) -> usize {
        self.peak_in_flight_rows.load(Ordering::SeqCst)
    }

    fn record(&self, batch: &Batch, committed: bool) {
        self.attempts.lock().unwrap().push(Attempt {
            worker_id: batch.worker_id,
            sequence: batch.sequence,
            lines: batch.rows.iter().map(|r| r.line).collect(),
            committed,
        });
    }
}

#[async_trait]
impl BatchWriter for RecordingWriter {
    async fn write_batch(&self, batch: Batch) -> Result<BatchReceipt, WriteError> {
        let rows = batch.len();
        let now = self.in_flight_rows.fetch_add(rows, Ordering::SeqCst) + rows;
        self.peak_in_flight_rows.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let attempt = self.attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
        let result = match self.lose_connection_after {
            Some(limit) if attempt > limit => Err(WriteError::Transaction(sqlx::Error::PoolClosed)),
            _ => self.apply(&batch),
        };
        self.in_flight_rows.fetch_sub(rows, Ordering::SeqCst);

        self.record(&batch, result.is_ok());
        result
    }
}

impl RecordingWriter {
    fn apply(&self, batch: &Batch) -> Result<BatchReceipt, WriteError> {
        // Convert everything before committing anything
        let records = batch
            .rows
            .iter()
            .cloned()
            .map(|row: Row| {
                let line = row.line;
                WardRecord::try_from(row).map_err(|source| WriteError::MalformedRow { line, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows_inserted = records.len() as u64;
        self.committed.lock().unwrap().extend(records);
        Ok(BatchReceipt { rows_inserted })
    }
}

/// Serves `data`, then fails every further read
pub struct FailingReader {
    data: Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Cursor::new(data.into()),
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.data.position() as usize >= self.data.get_ref().len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "upload interrupted",
            )));
        }
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}
