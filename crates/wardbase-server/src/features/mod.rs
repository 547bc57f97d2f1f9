//! Feature modules implementing the Wardbase API
//!
//! Each feature is organized as a vertical slice with its own commands and
//! routes.
//!
//! # Features
//!
//! - **uploads**: CSV uploads streamed through the ingestion pipeline
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - Write operations
//! - `routes.rs` - HTTP route definitions

pub mod uploads;

use crate::ingest::PipelineCoordinator;
use axum::Router;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Ingestion pipeline uploads are run through
    pub pipeline: PipelineCoordinator,
}

/// Creates the main API router with all feature routes mounted
///
/// Each feature is mounted under its own path prefix:
/// - `/uploads` - CSV ingestion
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest("/uploads", uploads::uploads_routes().with_state(state.pipeline))
}
