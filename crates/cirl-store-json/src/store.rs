//! [`JsonStore`]: the flat-file implementation of [`RecordStore`].

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde_json::Value;

use cirl_core::{
  analysis::HitAnalysis,
  document::{Collection, Document, sort_newest_first},
  model::{App, Dataset, Evaluation, Feedback, ModelConfig, OptimizationSuggestion},
  record::QueryRecord,
  stats::{RequestStats, StatsCache, cache_key, compute_stats},
  store::RecordStore,
};

use crate::{Error, Result, lock::FileLocks};

/// The file holding `collection` inside the data directory.
pub fn file_name(collection: Collection) -> &'static str {
  match collection {
    Collection::App => "apps.json",
    Collection::QueryRecord => "query-records.json",
    Collection::Feedback => "feedbacks.json",
    Collection::Dataset => "datasets.json",
    Collection::HitAnalysis => "hit-analyses.json",
    Collection::Evaluation => "evaluations.json",
    Collection::OptimizationSuggestion => "optimization-suggestions.json",
    Collection::ModelConfig => "models.json",
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A record store keeping one JSON array file per collection.
///
/// Cloning is cheap; clones share locks and the stats cache.
#[derive(Clone)]
pub struct JsonStore {
  inner: Arc<Inner>,
}

struct Inner {
  dir:   PathBuf,
  locks: FileLocks,
  stats: StatsCache,
}

impl JsonStore {
  /// Open the store rooted at `dir`, which must already exist. Collection
  /// files are created on first save.
  pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    match tokio::fs::metadata(&dir).await {
      Ok(meta) if meta.is_dir() => {}
      Ok(_) => return Err(Error::MissingDataDir(dir)),
      Err(err) if err.kind() == ErrorKind::NotFound => {
        return Err(Error::MissingDataDir(dir));
      }
      Err(err) => return Err(err.into()),
    }

    tracing::debug!(dir = %dir.display(), "opened json store");
    Ok(Self {
      inner: Arc::new(Inner { dir, locks: FileLocks::default(), stats: StatsCache::default() }),
    })
  }

  pub fn dir(&self) -> &Path { &self.inner.dir }

  pub fn path(&self, collection: Collection) -> PathBuf {
    self.inner.dir.join(file_name(collection))
  }

  /// Read a whole collection, newest first.
  pub async fn read<D: Document>(&self) -> Result<Vec<D>> {
    let file = file_name(D::COLLECTION);
    let lock = self.inner.locks.get(file);
    let _guard = lock.read().await;

    let mut items: Vec<D> = read_array(&self.path(D::COLLECTION)).await?;
    sort_newest_first(&mut items);
    Ok(items)
  }

  /// Replace a whole collection file. Documents are stored newest first,
  /// the order [`read`](Self::read) returns them in.
  pub async fn save<D: Document>(&self, items: &[D]) -> Result<()> {
    let file = file_name(D::COLLECTION);
    let mut items = items.to_vec();
    sort_newest_first(&mut items);
    let bytes = serde_json::to_vec_pretty(&items)?;

    let lock = self.inner.locks.get(file);
    let _guard = lock.write().await;
    tokio::fs::write(self.path(D::COLLECTION), bytes).await?;
    tracing::trace!(file, count = items.len(), "saved collection");
    Ok(())
  }

  async fn remove(&self, collection: Collection, id: &str) -> Result<bool> {
    let file = file_name(collection);
    let path = self.path(collection);

    let lock = self.inner.locks.get(file);
    let _guard = lock.write().await;

    let mut items: Vec<Value> = read_array(&path).await?;
    let Some(index) = items
      .iter()
      .position(|item| item.get("id").and_then(Value::as_str) == Some(id))
    else {
      return Ok(false);
    };
    items.remove(index);
    tokio::fs::write(&path, serde_json::to_vec_pretty(&items)?).await?;
    Ok(true)
  }
}

/// Missing and blank files are empty collections.
async fn read_array<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
  let text = match tokio::fs::read_to_string(path).await {
    Ok(text) => text,
    Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
    Err(err) => return Err(err.into()),
  };
  if text.trim().is_empty() {
    return Ok(Vec::new());
  }
  serde_json::from_str(&text).map_err(|source| Error::Corrupt { path: path.to_path_buf(), source })
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for JsonStore {
  type Error = Error;

  async fn read_apps(&self) -> Result<Vec<App>> { self.read().await }

  async fn save_apps(&self, apps: &[App]) -> Result<()> { self.save(apps).await }

  async fn read_query_records(&self) -> Result<Vec<QueryRecord>> { self.read().await }

  async fn save_query_records(&self, records: &[QueryRecord]) -> Result<()> {
    self.save(records).await
  }

  async fn read_feedbacks(&self) -> Result<Vec<Feedback>> { self.read().await }

  async fn save_feedbacks(&self, feedbacks: &[Feedback]) -> Result<()> {
    self.save(feedbacks).await
  }

  async fn read_datasets(&self) -> Result<Vec<Dataset>> { self.read().await }

  async fn save_datasets(&self, datasets: &[Dataset]) -> Result<()> {
    self.save(datasets).await
  }

  async fn read_hit_analyses(&self) -> Result<Vec<HitAnalysis>> { self.read().await }

  async fn save_hit_analyses(&self, analyses: &[HitAnalysis]) -> Result<()> {
    self.save(analyses).await
  }

  async fn read_evaluations(&self) -> Result<Vec<Evaluation>> { self.read().await }

  async fn save_evaluations(&self, evaluations: &[Evaluation]) -> Result<()> {
    self.save(evaluations).await
  }

  async fn read_optimization_suggestions(&self) -> Result<Vec<OptimizationSuggestion>> {
    self.read().await
  }

  async fn save_optimization_suggestions(
    &self,
    suggestions: &[OptimizationSuggestion],
  ) -> Result<()> {
    self.save(suggestions).await
  }

  async fn read_models(&self) -> Result<Vec<ModelConfig>> { self.read().await }

  async fn save_models(&self, models: &[ModelConfig]) -> Result<()> { self.save(models).await }

  async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
    self.remove(collection, id).await
  }

  async fn request_stats(&self, app_ids: &[String]) -> Result<RequestStats> {
    let key = cache_key(app_ids);
    if let Some(stats) = self.inner.stats.get(&key) {
      return Ok(stats);
    }

    let records: Vec<QueryRecord> = self.read().await?;
    let stats = compute_stats(&records, app_ids);
    self.inner.stats.insert(key, stats.clone());
    Ok(stats)
  }

  async fn close(&self) -> Result<()> {
    tracing::debug!(dir = %self.inner.dir.display(), "closed json store");
    Ok(())
  }
}
