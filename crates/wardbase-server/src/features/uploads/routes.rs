use crate::api::response::{ApiResponse, ErrorResponse};
use crate::ingest::PipelineCoordinator;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use super::commands::{IngestCsvCommand, IngestCsvError};

pub fn uploads_routes() -> Router<PipelineCoordinator> {
    Router::new().route("/", post(upload_csv))
}

#[tracing::instrument(skip(pipeline, multipart))]
async fn upload_csv(
    State(pipeline): State<PipelineCoordinator>,
    mut multipart: Multipart,
) -> Result<Response, UploadError> {
    let mut command: Option<IngestCsvCommand> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().map(|s| s.to_string());
            // Buffered whole; per-upload memory is capped by WARDBASE_MAX_UPLOAD_BYTES
            let content = field.bytes().await?;
            command = Some(IngestCsvCommand { filename, content });
            break;
        }
    }

    let command = command.ok_or(UploadError::NoFile)?;
    let filename = command.filename.clone();

    let summary = super::commands::ingest_csv::handle(pipeline, command).await?;

    tracing::info!(
        run_id = %summary.run_id,
        rows_committed = summary.rows_committed,
        batches_failed = summary.batches_failed,
        "CSV ingested via API"
    );

    let response = ApiResponse::success_with_meta(summary, json!({ "filename": filename }));
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("No file field found in multipart data")]
    NoFile,
    #[error("Failed to read multipart data: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Ingest(#[from] IngestCsvError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::NoFile => {
                let error = ErrorResponse::new("NO_FILE", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            UploadError::Multipart(ref e) => {
                let status = e.status();
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "PAYLOAD_TOO_LARGE"
                } else {
                    "INVALID_UPLOAD"
                };
                let error = ErrorResponse::new(code, e.body_text());
                (status, Json(error)).into_response()
            },
            UploadError::Ingest(IngestCsvError::FilenameLength) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            UploadError::Ingest(IngestCsvError::Ingest(ref e)) if e.is_client_error() => {
                let error = ErrorResponse::new("INVALID_CSV", e.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            UploadError::Ingest(IngestCsvError::Ingest(ref e)) => {
                tracing::error!("CSV ingest failed: {}", e);
                let error = ErrorResponse::new(
                    "INGEST_FAILED",
                    "Ingest aborted; batches committed before the failure remain in the table",
                );
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}
