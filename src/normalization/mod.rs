pub mod aliases;

pub use aliases::{canonical_field, normalize, normalize_type_tag};
