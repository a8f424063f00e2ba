//! Identifier → record lookup over the converter's snapshot files.

pub mod catalog;
pub mod record;
pub mod store;

pub use catalog::RecordCatalog;
pub use record::{normalize_coordinate, Record};
pub use store::{normalize_key, write_snapshot, RecordStore};
