//! [`Store`]: one [`RecordStore`] over whichever backend is configured.

use cirl_core::{
  analysis::HitAnalysis,
  document::Collection,
  model::{App, Dataset, Evaluation, Feedback, ModelConfig, OptimizationSuggestion},
  record::QueryRecord,
  stats::RequestStats,
  store::RecordStore,
};
use cirl_store_json::JsonStore;
use cirl_store_sqlite::{SqliteOptions, SqliteStore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, StoreConfig};

/// The available storage backends.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
  Json,
  Sqlite,
}

impl BackendKind {
  /// Parse a backend name. Unknown names are a validation error.
  pub fn parse(name: &str) -> Result<Self> {
    name.parse().map_err(|_| {
      cirl_core::Error::Validation(format!(
        "unknown data provider {name:?}, expected \"json\" or \"sqlite\""
      ))
      .into()
    })
  }
}

/// A record store backed by either backend.
///
/// Cloning is cheap and clones share the underlying backend.
#[derive(Clone)]
pub enum Store {
  Json(JsonStore),
  Sqlite(SqliteStore),
}

impl Store {
  /// Open the `kind` backend in `config.data_dir`.
  pub async fn open(kind: BackendKind, config: &StoreConfig) -> Result<Self> {
    Ok(match kind {
      BackendKind::Json => Self::Json(JsonStore::open(&config.data_dir).await?),
      BackendKind::Sqlite => {
        let options = SqliteOptions { buffer: config.buffer_options(), ..Default::default() };
        Self::Sqlite(SqliteStore::open_with_options(config.sqlite_path(), options).await?)
      }
    })
  }

  pub fn kind(&self) -> BackendKind {
    match self {
      Self::Json(_) => BackendKind::Json,
      Self::Sqlite(_) => BackendKind::Sqlite,
    }
  }

  pub fn as_sqlite(&self) -> Option<&SqliteStore> {
    match self {
      Self::Sqlite(store) => Some(store),
      Self::Json(_) => None,
    }
  }

  /// Push pending writes to disk. JSON saves are already durable.
  pub async fn flush(&self) -> Result<()> {
    match self {
      Self::Json(_) => Ok(()),
      Self::Sqlite(store) => Ok(store.flush().await?),
    }
  }
}

/// Forward a call to the active backend, converting its error.
macro_rules! dispatch {
  ($self:ident, $store:ident => $call:expr) => {
    match $self {
      Store::Json($store) => Ok($call.await?),
      Store::Sqlite($store) => Ok($call.await?),
    }
  };
}

impl RecordStore for Store {
  type Error = Error;

  async fn read_apps(&self) -> Result<Vec<App>> { dispatch!(self, s => s.read_apps()) }

  async fn save_apps(&self, apps: &[App]) -> Result<()> {
    dispatch!(self, s => s.save_apps(apps))
  }

  async fn read_query_records(&self) -> Result<Vec<QueryRecord>> {
    dispatch!(self, s => s.read_query_records())
  }

  async fn save_query_records(&self, records: &[QueryRecord]) -> Result<()> {
    dispatch!(self, s => s.save_query_records(records))
  }

  async fn read_feedbacks(&self) -> Result<Vec<Feedback>> {
    dispatch!(self, s => s.read_feedbacks())
  }

  async fn save_feedbacks(&self, feedbacks: &[Feedback]) -> Result<()> {
    dispatch!(self, s => s.save_feedbacks(feedbacks))
  }

  async fn read_datasets(&self) -> Result<Vec<Dataset>> {
    dispatch!(self, s => s.read_datasets())
  }

  async fn save_datasets(&self, datasets: &[Dataset]) -> Result<()> {
    dispatch!(self, s => s.save_datasets(datasets))
  }

  async fn read_hit_analyses(&self) -> Result<Vec<HitAnalysis>> {
    dispatch!(self, s => s.read_hit_analyses())
  }

  async fn save_hit_analyses(&self, analyses: &[HitAnalysis]) -> Result<()> {
    dispatch!(self, s => s.save_hit_analyses(analyses))
  }

  async fn read_evaluations(&self) -> Result<Vec<Evaluation>> {
    dispatch!(self, s => s.read_evaluations())
  }

  async fn save_evaluations(&self, evaluations: &[Evaluation]) -> Result<()> {
    dispatch!(self, s => s.save_evaluations(evaluations))
  }

  async fn read_optimization_suggestions(&self) -> Result<Vec<OptimizationSuggestion>> {
    dispatch!(self, s => s.read_optimization_suggestions())
  }

  async fn save_optimization_suggestions(
    &self,
    suggestions: &[OptimizationSuggestion],
  ) -> Result<()> {
    dispatch!(self, s => s.save_optimization_suggestions(suggestions))
  }

  async fn read_models(&self) -> Result<Vec<ModelConfig>> {
    dispatch!(self, s => s.read_models())
  }

  async fn save_models(&self, models: &[ModelConfig]) -> Result<()> {
    dispatch!(self, s => s.save_models(models))
  }

  async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
    dispatch!(self, s => s.delete(collection, id))
  }

  async fn request_stats(&self, app_ids: &[String]) -> Result<RequestStats> {
    dispatch!(self, s => s.request_stats(app_ids))
  }

  async fn close(&self) -> Result<()> { dispatch!(self, s => s.close()) }
}
