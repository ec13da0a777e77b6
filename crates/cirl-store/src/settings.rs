//! Store configuration: an optional file layered under `CIRL_*` environment
//! variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use cirl_core::buffer::{BufferOptions, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};
use serde::Deserialize;

use crate::{Result, store::BackendKind};

/// Name of the SQLite database file inside the data directory.
pub const SQLITE_FILE: &str = "cirl.db";

/// Prefix of the environment variables read by [`StoreConfig::load`].
const ENV_PREFIX: &str = "CIRL";

/// Runtime settings of the store layer.
///
/// | Key                           | Environment                        | Default  |
/// |-------------------------------|------------------------------------|----------|
/// | `data_dir`                    | `CIRL_DATA_DIR`                    | `data`   |
/// | `data_provider`               | `CIRL_DATA_PROVIDER`               | `sqlite` |
/// | `write_buffer_batch_size`     | `CIRL_WRITE_BUFFER_BATCH_SIZE`     | `100`    |
/// | `write_buffer_flush_interval` | `CIRL_WRITE_BUFFER_FLUSH_INTERVAL` | `5000`   |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub data_dir:                    PathBuf,
  /// Backend name; `None` selects SQLite.
  pub data_provider:               Option<String>,
  pub write_buffer_batch_size:     usize,
  /// Milliseconds.
  pub write_buffer_flush_interval: u64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      data_dir:                    PathBuf::from("data"),
      data_provider:               None,
      write_buffer_batch_size:     DEFAULT_BATCH_SIZE,
      write_buffer_flush_interval: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
    }
  }
}

impl StoreConfig {
  /// Load from `file` (skipped when absent) overridden by the process
  /// environment.
  pub fn load(file: Option<&Path>) -> Result<Self> {
    Self::load_with(file, config::Environment::with_prefix(ENV_PREFIX))
  }

  pub(crate) fn load_with(file: Option<&Path>, env: config::Environment) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(file) = file {
      builder = builder.add_source(config::File::from(file).required(false));
    }
    let settings = builder.add_source(env.try_parsing(true)).build()?;
    Ok(settings.try_deserialize()?)
  }

  /// The configured backend, if any. An unknown name is a validation error.
  pub fn provider(&self) -> Result<Option<BackendKind>> {
    self.data_provider.as_deref().map(BackendKind::parse).transpose()
  }

  pub fn buffer_options(&self) -> BufferOptions {
    BufferOptions {
      batch_size:     self.write_buffer_batch_size.max(1),
      flush_interval: Duration::from_millis(self.write_buffer_flush_interval),
    }
  }

  pub fn sqlite_path(&self) -> PathBuf { self.data_dir.join(SQLITE_FILE) }
}
