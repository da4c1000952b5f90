pub mod api;
pub mod database_ops;
pub mod error;
pub mod import;
pub mod logging;
pub mod normalization;
pub mod orchestrator;
pub mod schema;

pub mod util {
    pub mod env;
}

pub use error::{DataError, ImportError};
pub use orchestrator::{import_batch, parse_batch, ImportSummary};
pub use schema::SchemaRegistry;
