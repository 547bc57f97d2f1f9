pub mod commands;
pub mod routes;

pub use commands::{IngestCsvCommand, IngestCsvError};

pub use routes::uploads_routes;
