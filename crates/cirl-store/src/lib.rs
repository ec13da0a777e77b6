//! Backend selection for the CIRL record store.
//!
//! [`StoreSelector`] owns the single process-wide [`Store`], opening the
//! backend named by [`StoreConfig`] on first use. [`migrate`] copies a JSON
//! data directory into the SQLite backend.

mod selector;
mod settings;
mod store;

pub mod error;
pub mod migrate;

pub use error::{Error, Result};
pub use selector::StoreSelector;
pub use settings::{SQLITE_FILE, StoreConfig};
pub use store::{BackendKind, Store};

#[cfg(test)]
mod tests;
