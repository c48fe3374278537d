//! Persistence store, constructed once in main and shared as `Arc<Database>`

mod sqlite;
mod tables;

pub use sqlite::Database;
pub(crate) use sqlite::parse_timestamp;
