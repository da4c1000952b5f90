//! Per-record import steps: field upsert and many-to-many reconciliation.

pub mod reconcile;
pub mod upsert;

pub use reconcile::{extract_relation_lists, reconcile, RelationLists};
pub use upsert::{has_identifier, prepare, upsert, PreparedRecord};
