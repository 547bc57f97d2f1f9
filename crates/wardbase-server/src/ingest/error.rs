//! Pipeline error types

use thiserror::Error;
use wardbase_common::types::FieldCountError;

/// Run-level failures returned to the caller of the pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV stream is empty: no header row")]
    MissingHeader,

    #[error("Failed to decode CSV header: {0}")]
    Header(#[source] csv_async::Error),

    #[error("Database connection lost: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Ingest task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// The input, not the service, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, IngestError::MissingHeader | IngestError::Header(_))
    }
}

/// Failure of a single batch write
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Row at line {line} is malformed: {source}")]
    MalformedRow {
        line: u64,
        #[source]
        source: FieldCountError,
    },

    #[error("Transaction failed: {0}")]
    Transaction(#[from] sqlx::Error),
}

impl WriteError {
    /// Connection-level failures end the whole run; everything else only
    /// costs the batch.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            WriteError::MalformedRow { .. } => false,
            WriteError::Transaction(e) => is_connection_error(e),
        }
    }

    /// Promote a connection-level failure to a run-level error, handing any
    /// other failure back unchanged.
    pub fn into_fatal(self) -> Result<IngestError, WriteError> {
        match self {
            WriteError::Transaction(e) if is_connection_error(&e) => Ok(IngestError::Connection(e)),
            other => Err(other),
        }
    }
}

pub fn is_connection_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
