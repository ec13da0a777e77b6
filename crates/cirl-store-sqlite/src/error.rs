//! Error type for `cirl-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] cirl_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A stored column value could not be mapped back to its document field.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("data directory does not exist: {}", .0.display())]
  MissingDataDir(PathBuf),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
