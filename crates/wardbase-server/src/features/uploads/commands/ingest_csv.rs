use crate::ingest::{IngestError, IngestSummary, PipelineCoordinator};
use axum::body::Bytes;
use std::io::Cursor;

const MAX_FILENAME_LEN: usize = 255;

/// Ingest one uploaded CSV document
#[derive(Debug, Clone)]
pub struct IngestCsvCommand {
    /// Client-supplied filename, for logging only
    pub filename: Option<String>,
    pub content: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestCsvError {
    #[error("Filename must not exceed 255 characters")]
    FilenameLength,
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl IngestCsvCommand {
    pub fn validate(&self) -> Result<(), IngestCsvError> {
        if let Some(filename) = &self.filename {
            if filename.len() > MAX_FILENAME_LEN {
                return Err(IngestCsvError::FilenameLength);
            }
        }
        Ok(())
    }
}

#[tracing::instrument(skip(pipeline, command), fields(filename = ?command.filename, bytes = command.content.len()))]
pub async fn handle(
    pipeline: PipelineCoordinator,
    command: IngestCsvCommand,
) -> Result<IngestSummary, IngestCsvError> {
    command.validate()?;

    let summary = pipeline.run(Cursor::new(command.content)).await?;
    Ok(summary)
}
