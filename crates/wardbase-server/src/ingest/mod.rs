//! CSV ingestion pipeline
//!
//! A single producer decodes the input and feeds a bounded channel. A fixed
//! pool of workers drains the channel, each committing its rows in batches of
//! one transaction apiece.
//!
//! - **source**: header handling and the producer task
//! - **worker**: per-worker batch accumulation
//! - **writer**: transactional batch inserts (`BatchWriter`, `PgBatchWriter`)
//! - **coordinator**: run lifecycle and result aggregation
//! - **config**: pipeline tunables (INGEST_* environment variables)

pub mod config;
pub mod coordinator;
pub mod error;
pub mod source;
pub mod types;
pub mod worker;
pub mod writer;

pub use config::{MalformedRowPolicy, PipelineConfig};
pub use coordinator::PipelineCoordinator;
pub use error::{IngestError, WriteError};
pub use source::{RecordSource, SourceEvent};
pub use types::{
    Batch, BatchFailure, BatchReceipt, IngestSummary, PipelineState, Row, SourceReport,
    WorkerReport,
};
pub use worker::{BatchWorker, BufferGauge};
pub use writer::{BatchWriter, PgBatchWriter};
