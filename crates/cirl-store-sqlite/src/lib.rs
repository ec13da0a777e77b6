//! SQLite backend for the CIRL record store.
//!
//! The live database is held in memory and driven through
//! [`tokio_rusqlite`], so all database work runs off the async runtime.
//! Changes reach the data file through debounced snapshots.

mod encode;
mod persist;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use persist::DEFAULT_SNAPSHOT_DELAY;
pub use store::{SqliteOptions, SqliteStore};
