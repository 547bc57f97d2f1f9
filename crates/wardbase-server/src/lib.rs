//! Wardbase Server Library
//!
//! Bulk loader for ward reference data. CSV documents are decoded by a
//! single producer and committed to PostgreSQL by a fixed pool of workers,
//! one transaction per batch.
//!
//! # Overview
//!
//! - **Ingest**: the streaming pipeline (`ingest::PipelineCoordinator`)
//! - **API Endpoints**: multipart CSV upload over HTTP
//! - **Configuration**: environment-based configuration management
//! - **Middleware**: CORS and request logging
//!
//! # Example
//!
//! ```no_run
//! use wardbase_server::ingest::{PipelineConfig, PipelineCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgresql://localhost/wardbase").await?;
//!     let pipeline = PipelineCoordinator::postgres(pool, PipelineConfig::default())?;
//!     let file = tokio::fs::File::open("wards.csv").await?;
//!     let summary = pipeline.run(file).await?;
//!     println!("{} rows committed", summary.rows_committed);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

// Re-export commonly used types
pub use error::AppError;
