//! Flat-file JSON backend for the CIRL record store.
//!
//! Each collection is one pretty-printed JSON array in the data directory.
//! Access to each file is serialized by its own reader/writer lock.

mod lock;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{JsonStore, file_name};

#[cfg(test)]
mod tests;
