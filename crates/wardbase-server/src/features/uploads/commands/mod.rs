pub mod ingest_csv;

pub use ingest_csv::{IngestCsvCommand, IngestCsvError};
