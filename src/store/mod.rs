//! Persistence layer — libSQL-backed storage for relay state, drafts,
//! and the relay log.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, RelayLogRecord, RelayMethod};
