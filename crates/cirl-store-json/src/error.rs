//! Error type for `cirl-store-json`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] cirl_core::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A collection file exists but does not hold a valid JSON array of the
  /// expected documents.
  #[error("corrupt collection file {}: {source}", path.display())]
  Corrupt {
    path:   PathBuf,
    source: serde_json::Error,
  },

  #[error("data directory does not exist: {}", .0.display())]
  MissingDataDir(PathBuf),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
