//! Persistence layer: SQLite-backed storage for received messages.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{InsertOutcome, MessageStore, StoredMessage};
