//! Error types for `cirl-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A cross-field invariant or an enumerated value was violated. Never
  /// retried.
  #[error("validation error: {0}")]
  Validation(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
