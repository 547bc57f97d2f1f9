//! Wardbase Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the wardbase workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`WardbaseError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by environment variables
//! - **Types**: the ward record shape persisted by the ingestion pipeline
//!
//! # Example
//!
//! ```no_run
//! use wardbase_common::types::WardRecord;
//!
//! let fields = vec!["Guntur", "Tenali", "Kolakaluru", "Guntur", "Tenali", "12"]
//!     .into_iter()
//!     .map(String::from)
//!     .collect();
//! let record = WardRecord::from_fields(fields).unwrap();
//! assert_eq!(record.no_of_wards, "12");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, WardbaseError};
