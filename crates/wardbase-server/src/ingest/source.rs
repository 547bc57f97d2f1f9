//! Record source: sequential CSV decoding feeding the distribution channel
//!
//! The header is read synchronously by the coordinator before any task is
//! spawned. Everything after it is decoded on the producer task, which is the
//! only owner of the reader and the only sender on the channel.

use csv_async::{AsyncReader, AsyncReaderBuilder, ErrorKind, StringRecord};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::IngestError;
use super::types::{Row, SourceReport};

/// Result of one read past the header
#[derive(Debug)]
pub enum SourceEvent {
    Row(Row),
    /// The row could not be decoded; the stream continues
    Skipped { line: u64, error: csv_async::Error },
    /// The underlying stream failed; nothing more can be read
    Broken(csv_async::Error),
    End,
}

/// Lazily decodes a CSV byte stream into [`Row`]s
pub struct RecordSource<R> {
    reader: AsyncReader<R>,
    record: StringRecord,
}

impl<R> RecordSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(input: R) -> Self {
        // Field counts are checked explicitly further down the pipeline
        let reader = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .create_reader(input);

        Self {
            reader,
            record: StringRecord::new(),
        }
    }

    /// Read and return the header row.
    ///
    /// Must be the first read. An empty stream or an undecodable header fails
    /// the run.
    pub async fn read_header(&mut self) -> Result<Vec<String>, IngestError> {
        match self.reader.read_record(&mut self.record).await {
            Ok(true) => Ok(self.record.iter().map(str::to_owned).collect()),
            Ok(false) => Err(IngestError::MissingHeader),
            Err(e) => Err(IngestError::Header(e)),
        }
    }

    pub async fn next_event(&mut self) -> SourceEvent {
        match self.reader.read_record(&mut self.record).await {
            Ok(true) => {
                let line = self
                    .record
                    .position()
                    .map(|p| p.line())
                    .unwrap_or_else(|| self.reader.position().line());
                SourceEvent::Row(Row::new(line, self.record.iter().map(str::to_owned).collect()))
            },
            Ok(false) => SourceEvent::End,
            Err(e) if matches!(e.kind(), ErrorKind::Io(_)) => SourceEvent::Broken(e),
            Err(e) => SourceEvent::Skipped {
                line: self.reader.position().line(),
                error: e,
            },
        }
    }

    /// Producer loop. Pushes rows until end of stream, then drops `tx`,
    /// which closes the channel for the workers.
    pub async fn run(mut self, tx: mpsc::Sender<Row>, cancel: CancellationToken) -> SourceReport {
        let mut report = SourceReport::default();

        loop {
            let row = match self.next_event().await {
                SourceEvent::Row(row) => row,
                SourceEvent::Skipped { line, error } => {
                    tracing::warn!(line, error = %error, "Skipping undecodable CSV row");
                    report.rows_skipped += 1;
                    continue;
                },
                SourceEvent::Broken(error) => {
                    tracing::error!(error = %error, rows_sent = report.rows_sent, "CSV stream failed, ending input early");
                    report.truncated = true;
                    break;
                },
                SourceEvent::End => break,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Record source cancelled");
                    break;
                }
                sent = tx.send(row) => {
                    if sent.is_err() {
                        tracing::debug!("All workers exited, stopping record source");
                        break;
                    }
                    report.rows_sent += 1;
                }
            }
        }

        tracing::debug!(
            rows_sent = report.rows_sent,
            rows_skipped = report.rows_skipped,
            "Record source finished"
        );
        report
    }
}
