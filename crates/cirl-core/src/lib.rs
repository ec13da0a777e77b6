//! Core types and trait definitions for the CIRL record store.
//!
//! This crate is deliberately free of database and filesystem dependencies.
//! The backend crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod analysis;
pub mod buffer;
pub mod document;
pub mod error;
pub mod model;
pub mod record;
pub mod stats;
pub mod store;
pub mod timestamp;

pub use error::{Error, Result};
