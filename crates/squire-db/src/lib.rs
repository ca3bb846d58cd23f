//! PostgreSQL access for squire
//!
//! A thin layer over `tokio-postgres`: connecting with readiness polling,
//! executing whole SQL documents with error positions translated to
//! line/column, recreating a logical database, and decoding query results
//! into displayable tables.

pub mod database;
pub mod error;
pub mod readiness;
pub mod reset;
pub mod value;

pub use database::Database;
pub use error::DbError;
pub use readiness::{wait_ready, ReadinessError, ReadinessPolicy};
pub use reset::{quote_ident, recreate_database};
pub use value::{wrap_text, ResultTable, Value, WRAP_WIDTH};
