//! Error type for `cirl-store`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] cirl_core::Error),

  #[error("json store error: {0}")]
  Json(#[from] cirl_store_json::Error),

  #[error("sqlite store error: {0}")]
  Sqlite(#[from] cirl_store_sqlite::Error),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
