//! [`SqliteStore`]: the SQLite implementation of [`RecordStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use rusqlite::params;

use cirl_core::{
  analysis::HitAnalysis,
  buffer::{BatchWriter, BufferOptions, WriteBuffer},
  document::Collection,
  model::{App, Dataset, Evaluation, Feedback, ModelConfig, OptimizationSuggestion},
  record::QueryRecord,
  stats::{
    BucketCounts, RequestStats, StatsCache, assign_timeline, cache_key, ensure_entry,
    timeline_configs,
  },
  store::RecordStore,
  timestamp,
};

use crate::{
  Error, Result,
  encode::{
    self, RawApp, RawDataset, RawEvaluation, RawFeedback, RawHitAnalysis, RawModel,
    RawOptimizationSuggestion, RawQueryRecord, Statement,
  },
  persist::{DEFAULT_SNAPSHOT_DELAY, Database},
};

/// Tuning knobs for [`SqliteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOptions {
  /// Batching of query-record writes.
  pub buffer:         BufferOptions,
  /// Delay between the first unsaved write and the snapshot to disk.
  pub snapshot_delay: Duration,
}

impl Default for SqliteOptions {
  fn default() -> Self {
    Self { buffer: BufferOptions::default(), snapshot_delay: DEFAULT_SNAPSHOT_DELAY }
  }
}

// ─── Query-record sink ───────────────────────────────────────────────────────

/// Drains the query-record buffer into the database.
struct QueryRecordSink {
  db: Database,
}

impl BatchWriter<QueryRecord> for QueryRecordSink {
  type Error = Error;

  async fn write_batch(&self, batch: &[QueryRecord]) -> Result<()> {
    let statements = batch
      .iter()
      .map(encode::upsert_query_record)
      .collect::<Result<Vec<_>>>()?;
    self.db.execute(statements).await
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A CIRL record store backed by an in-memory SQLite database with deferred
/// snapshots to a single file.
///
/// Query-record saves smaller than the buffer's batch size are coalesced by a
/// [`WriteBuffer`]; every other operation drains that buffer first, so reads
/// always see earlier writes. Saves of every other collection replace the
/// whole collection: rows whose ids are absent from the list are deleted and
/// their dependants cascade. Query-record saves only upsert; remove a record
/// with [`RecordStore::delete`].
///
/// Cloning is cheap; clones share the connection and the buffer.
#[derive(Clone)]
pub struct SqliteStore {
  inner: Arc<Inner>,
}

struct Inner {
  db:      Database,
  records: WriteBuffer<QueryRecord, QueryRecordSink>,
  stats:   StatsCache,
}

impl SqliteStore {
  /// Open (or create) a store persisted to `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_options(path, SqliteOptions::default()).await
  }

  pub async fn open_with_options(path: impl AsRef<Path>, options: SqliteOptions) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
      if !tokio::fs::try_exists(dir).await? {
        return Err(Error::MissingDataDir(dir.to_path_buf()));
      }
    }
    Ok(Self::build(Database::open(Some(path), options.snapshot_delay).await?, options))
  }

  /// Open a store that is never written to disk. Useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with_options(SqliteOptions::default()).await
  }

  pub async fn open_in_memory_with_options(options: SqliteOptions) -> Result<Self> {
    Ok(Self::build(Database::open(None, options.snapshot_delay).await?, options))
  }

  fn build(db: Database, options: SqliteOptions) -> Self {
    let records = WriteBuffer::new(QueryRecordSink { db: db.clone() }, options.buffer);
    Self { inner: Arc::new(Inner { db, records, stats: StatsCache::default() }) }
  }

  pub fn path(&self) -> Option<&Path> { self.inner.db.path() }

  /// Number of query records waiting in the write buffer.
  pub fn pending_records(&self) -> usize { self.inner.records.len() }

  /// Drain the write buffer and snapshot to disk immediately.
  pub async fn flush(&self) -> Result<()> {
    self.inner.records.sync().await?;
    self.inner.db.snapshot().await
  }

  async fn settle(&self) -> Result<()> { self.inner.records.sync().await }

  async fn select<R, T>(
    &self,
    sql: &'static str,
    from_row: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
    decode: fn(R) -> Result<T>,
  ) -> Result<Vec<T>>
  where
    R: Send + 'static,
  {
    self.settle().await?;
    let raws: Vec<R> = self
      .inner
      .db
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map([], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(decode).collect()
  }

  /// Read owners together with their ordered join-table members.
  async fn select_with_members<R>(
    &self,
    sql: &'static str,
    members_sql: &'static str,
    from_row: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
  ) -> Result<(Vec<R>, encode::Members)>
  where
    R: Send + 'static,
  {
    self.settle().await?;
    let (raws, pairs) = self
      .inner
      .db
      .call(move |conn| {
        let raws = conn
          .prepare_cached(sql)?
          .query_map([], from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let pairs = conn
          .prepare_cached(members_sql)?
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok((raws, pairs))
      })
      .await?;
    Ok((raws, encode::collect_members(pairs)))
  }

  /// Replace a whole collection: prune absent ids, then upsert the rest.
  async fn replace<T>(
    &self,
    collection: Collection,
    items: &[T],
    id: fn(&T) -> &str,
    upsert: impl Fn(&T) -> Result<Statement>,
  ) -> Result<()> {
    self.settle().await?;
    let mut statements = Vec::with_capacity(items.len() + 1);
    statements.push(encode::prune(collection, items.iter().map(id))?);
    for item in items {
      statements.push(upsert(item)?);
    }
    self.inner.db.execute(statements).await
  }

  async fn count_and_bucket(&self, app_ids: &[String]) -> Result<RequestStats> {
    let now = Utc::now();
    let configs = timeline_configs(now);
    let filter = serde_json::to_string(app_ids)?;

    let queries: Vec<(String, &'static str)> = configs
      .iter()
      .map(|c| (timestamp::format(&c.since), c.window.strftime_bucket()))
      .collect();

    type Counts = Vec<(String, i64)>;
    type Buckets = Vec<(String, Option<String>, i64)>;
    let results: Vec<(Counts, Buckets)> = self
      .inner
      .db
      .call(move |conn| {
        let mut out = Vec::with_capacity(queries.len());
        for (since, format) in &queries {
          let counts = conn
            .prepare_cached(
              "SELECT app_id, COUNT(*) FROM query_records
               WHERE created_at >= ?1
                 AND COALESCE(ignored, 0) = 0
                 AND (json_array_length(?2) = 0
                      OR app_id IN (SELECT value FROM json_each(?2)))
               GROUP BY app_id",
            )?
            .query_map(params![since, filter], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Counts>>()?;
          let buckets = conn
            .prepare_cached(
              "SELECT app_id, strftime(?3, created_at) AS bucket, COUNT(*)
               FROM query_records
               WHERE created_at >= ?1
                 AND COALESCE(ignored, 0) = 0
                 AND (json_array_length(?2) = 0
                      OR app_id IN (SELECT value FROM json_each(?2)))
               GROUP BY app_id, bucket",
            )?
            .query_map(params![since, filter, format], |row| {
              Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Buckets>>()?;
          out.push((counts, buckets));
        }
        Ok(out)
      })
      .await?;

    let mut stats = RequestStats::new();
    for (config, (counts, _)) in configs.iter().zip(&results) {
      for (app_id, count) in counts {
        *ensure_entry(&mut stats, app_id).count_mut(config.window) = *count as u64;
      }
    }
    for app_id in app_ids {
      ensure_entry(&mut stats, app_id);
    }
    for (config, (_, buckets)) in configs.iter().zip(results) {
      let mut values = BucketCounts::new();
      for (app_id, bucket, count) in buckets {
        let Some(bucket) = bucket else {
          continue;
        };
        let at = encode::decode_dt(&bucket)?;
        *values.entry(app_id).or_default().entry(at).or_default() += count as u64;
      }
      assign_timeline(&mut stats, app_ids, config, &values);
    }
    Ok(stats)
  }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Apps ──────────────────────────────────────────────────────────────────

  async fn read_apps(&self) -> Result<Vec<App>> {
    self.select(encode::SELECT_APPS, RawApp::from_row, RawApp::into_app).await
  }

  async fn save_apps(&self, apps: &[App]) -> Result<()> {
    self.replace(Collection::App, apps, |a| a.id.as_str(), encode::upsert_app).await
  }

  // ── Query records ─────────────────────────────────────────────────────────

  async fn read_query_records(&self) -> Result<Vec<QueryRecord>> {
    self
      .select(
        encode::SELECT_QUERY_RECORDS,
        RawQueryRecord::from_row,
        RawQueryRecord::into_query_record,
      )
      .await
  }

  async fn save_query_records(&self, records: &[QueryRecord]) -> Result<()> {
    let buffer = &self.inner.records;
    if records.len() < buffer.options().batch_size {
      for record in records {
        buffer.add(record.clone()).await?;
      }
      return Ok(());
    }

    self.settle().await?;
    let statements = records
      .iter()
      .map(encode::upsert_query_record)
      .collect::<Result<Vec<_>>>()?;
    self.inner.db.execute(statements).await
  }

  // ── Feedbacks ─────────────────────────────────────────────────────────────

  async fn read_feedbacks(&self) -> Result<Vec<Feedback>> {
    self
      .select(encode::SELECT_FEEDBACKS, RawFeedback::from_row, RawFeedback::into_feedback)
      .await
  }

  async fn save_feedbacks(&self, feedbacks: &[Feedback]) -> Result<()> {
    self
      .replace(Collection::Feedback, feedbacks, |f| f.id.as_str(), |f| Ok(encode::upsert_feedback(f)))
      .await
  }

  // ── Datasets ──────────────────────────────────────────────────────────────

  async fn read_datasets(&self) -> Result<Vec<Dataset>> {
    let (raws, mut members) = self
      .select_with_members(
        encode::SELECT_DATASETS,
        encode::SELECT_DATASET_MEMBERS,
        RawDataset::from_row,
      )
      .await?;
    raws.into_iter().map(|raw| raw.into_dataset(&mut members)).collect()
  }

  async fn save_datasets(&self, datasets: &[Dataset]) -> Result<()> {
    self.settle().await?;
    let ids = serde_json::to_string(&datasets.iter().map(|d| d.id.as_str()).collect::<Vec<_>>())?;
    let mut statements = vec![
      Statement::new(
        "DELETE FROM dataset_query_records
         WHERE dataset_id NOT IN (SELECT value FROM json_each(?1))",
        vec![rusqlite::types::Value::Text(ids)],
      ),
      encode::prune(Collection::Dataset, datasets.iter().map(|d| d.id.as_str()))?,
    ];
    for dataset in datasets {
      encode::write_dataset(dataset, &mut statements)?;
    }
    self.inner.db.execute(statements).await
  }

  // ── Hit analyses ──────────────────────────────────────────────────────────

  async fn read_hit_analyses(&self) -> Result<Vec<HitAnalysis>> {
    self
      .select(
        encode::SELECT_HIT_ANALYSES,
        RawHitAnalysis::from_row,
        RawHitAnalysis::into_hit_analysis,
      )
      .await
  }

  async fn save_hit_analyses(&self, analyses: &[HitAnalysis]) -> Result<()> {
    self
      .replace(Collection::HitAnalysis, analyses, |a| a.id.as_str(), encode::upsert_hit_analysis)
      .await
  }

  // ── Evaluations ───────────────────────────────────────────────────────────

  async fn read_evaluations(&self) -> Result<Vec<Evaluation>> {
    let (raws, mut members) = self
      .select_with_members(
        encode::SELECT_EVALUATIONS,
        encode::SELECT_EVALUATION_MEMBERS,
        RawEvaluation::from_row,
      )
      .await?;
    raws.into_iter().map(|raw| raw.into_evaluation(&mut members)).collect()
  }

  async fn save_evaluations(&self, evaluations: &[Evaluation]) -> Result<()> {
    self.settle().await?;
    let ids =
      serde_json::to_string(&evaluations.iter().map(|e| e.id.as_str()).collect::<Vec<_>>())?;
    let mut statements = vec![
      Statement::new(
        "DELETE FROM evaluation_query_records
         WHERE evaluation_id NOT IN (SELECT value FROM json_each(?1))",
        vec![rusqlite::types::Value::Text(ids)],
      ),
      encode::prune(Collection::Evaluation, evaluations.iter().map(|e| e.id.as_str()))?,
    ];
    for evaluation in evaluations {
      encode::write_evaluation(evaluation, &mut statements)?;
    }
    self.inner.db.execute(statements).await
  }

  // ── Optimization suggestions ──────────────────────────────────────────────

  async fn read_optimization_suggestions(&self) -> Result<Vec<OptimizationSuggestion>> {
    self
      .select(
        encode::SELECT_OPTIMIZATION_SUGGESTIONS,
        RawOptimizationSuggestion::from_row,
        RawOptimizationSuggestion::into_suggestion,
      )
      .await
  }

  async fn save_optimization_suggestions(
    &self,
    suggestions: &[OptimizationSuggestion],
  ) -> Result<()> {
    self
      .replace(Collection::OptimizationSuggestion, suggestions, |s| s.id.as_str(), |s| {
        Ok(encode::upsert_suggestion(s))
      })
      .await
  }

  // ── Models ────────────────────────────────────────────────────────────────

  async fn read_models(&self) -> Result<Vec<ModelConfig>> {
    self.select(encode::SELECT_MODELS, RawModel::from_row, RawModel::into_model).await
  }

  async fn save_models(&self, models: &[ModelConfig]) -> Result<()> {
    self.replace(Collection::ModelConfig, models, |m| m.id.as_str(), encode::upsert_model).await
  }

  // ── Delete ────────────────────────────────────────────────────────────────

  async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
    self.settle().await?;
    let sql = format!("DELETE FROM {} WHERE id = ?1", encode::table(collection));
    let id = id.to_owned();
    let removed = self
      .inner
      .db
      .call(move |conn| Ok(conn.execute(&sql, params![id])?))
      .await?;

    if removed > 0 {
      self.inner.db.mark_dirty();
    }
    Ok(removed > 0)
  }

  // ── Stats ─────────────────────────────────────────────────────────────────

  async fn request_stats(&self, app_ids: &[String]) -> Result<RequestStats> {
    let key = cache_key(app_ids);
    if let Some(stats) = self.inner.stats.get(&key) {
      return Ok(stats);
    }

    self.settle().await?;
    let stats = self.count_and_bucket(app_ids).await?;
    self.inner.stats.insert(key, stats.clone());
    Ok(stats)
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  async fn close(&self) -> Result<()> {
    self.inner.records.close().await?;
    self.inner.db.close().await?;
    tracing::info!("closed sqlite store");
    Ok(())
  }
}
