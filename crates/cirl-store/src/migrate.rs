//! One-way migration of a JSON data directory into the SQLite backend.
//!
//! Collections are imported parents first so every foreign key resolves.
//! Once all of them are in and the database has been flushed, each imported
//! `<name>.json` is renamed to `<name>.json.backup`. A backup left by an
//! earlier run marks that collection as migrated and it is not imported
//! again.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use cirl_core::{
  document::{Collection, Document},
  store::RecordStore,
};
use cirl_store_json::JsonStore;
use cirl_store_sqlite::SqliteStore;

use crate::Result;

/// Import order: owners before the documents that reference them.
pub const MIGRATION_ORDER: [Collection; 8] = [
  Collection::App,
  Collection::QueryRecord,
  Collection::Feedback,
  Collection::Dataset,
  Collection::HitAnalysis,
  Collection::Evaluation,
  Collection::OptimizationSuggestion,
  Collection::ModelConfig,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// This many documents were copied.
  Imported(usize),
  /// No JSON file for the collection.
  Missing,
  /// A backup from an earlier migration exists.
  AlreadyMigrated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
  pub collections: Vec<(Collection, Outcome)>,
}

impl MigrationReport {
  pub fn outcome(&self, collection: Collection) -> Option<Outcome> {
    self.collections.iter().find(|(c, _)| *c == collection).map(|(_, outcome)| *outcome)
  }

  pub fn imported(&self) -> usize {
    self
      .collections
      .iter()
      .map(|(_, outcome)| match outcome {
        Outcome::Imported(count) => *count,
        _ => 0,
      })
      .sum()
  }
}

/// Path the JSON file of a migrated collection is moved to.
pub fn backup_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(".backup");
  PathBuf::from(name)
}

/// Keep the stored documents the import does not mention, then the import.
fn merge<D: Document>(existing: Vec<D>, incoming: &[D]) -> Vec<D> {
  let ids: HashSet<&str> = incoming.iter().map(Document::id).collect();
  existing
    .into_iter()
    .filter(|doc| !ids.contains(doc.id()))
    .chain(incoming.iter().cloned())
    .collect()
}

/// Copy one whole-replace collection, keeping rows already in SQLite.
macro_rules! import_merged {
  ($json:expr, $sqlite:expr, $read:ident, $save:ident) => {{
    let incoming = $json.$read().await?;
    let merged = merge($sqlite.$read().await?, &incoming);
    $sqlite.$save(&merged).await?;
    incoming.len()
  }};
}

async fn import(json: &JsonStore, sqlite: &SqliteStore, collection: Collection) -> Result<usize> {
  Ok(match collection {
    Collection::App => import_merged!(json, sqlite, read_apps, save_apps),
    // Query-record saves upsert, so the incoming list is enough.
    Collection::QueryRecord => {
      let records = json.read_query_records().await?;
      sqlite.save_query_records(&records).await?;
      records.len()
    }
    Collection::Feedback => import_merged!(json, sqlite, read_feedbacks, save_feedbacks),
    Collection::Dataset => import_merged!(json, sqlite, read_datasets, save_datasets),
    Collection::HitAnalysis => import_merged!(json, sqlite, read_hit_analyses, save_hit_analyses),
    Collection::Evaluation => import_merged!(json, sqlite, read_evaluations, save_evaluations),
    Collection::OptimizationSuggestion => import_merged!(
      json,
      sqlite,
      read_optimization_suggestions,
      save_optimization_suggestions
    ),
    Collection::ModelConfig => import_merged!(json, sqlite, read_models, save_models),
  })
}

/// Migrate every collection found in `data_dir` into `sqlite`.
///
/// A corrupt JSON file aborts the run before any file is renamed; collections
/// imported up to that point stay in the database and are imported again,
/// idempotently, by the next run.
pub async fn migrate(data_dir: &Path, sqlite: &SqliteStore) -> Result<MigrationReport> {
  let json = JsonStore::open(data_dir).await?;
  let mut report = MigrationReport::default();

  for collection in MIGRATION_ORDER {
    let path = json.path(collection);
    let outcome = if tokio::fs::try_exists(backup_path(&path)).await? {
      tracing::warn!(%collection, "backup exists, skipping already migrated collection");
      Outcome::AlreadyMigrated
    } else if !tokio::fs::try_exists(&path).await? {
      tracing::debug!(%collection, "no json file, skipping");
      Outcome::Missing
    } else {
      let count = import(&json, sqlite, collection).await?;
      tracing::info!(%collection, count, "imported collection");
      Outcome::Imported(count)
    };
    report.collections.push((collection, outcome));
  }

  sqlite.flush().await?;

  for (collection, outcome) in &report.collections {
    if !matches!(outcome, Outcome::Imported(_)) {
      continue;
    }
    let path = json.path(*collection);
    tokio::fs::rename(&path, backup_path(&path)).await?;
  }

  tracing::info!(imported = report.imported(), "migration complete");
  Ok(report)
}
