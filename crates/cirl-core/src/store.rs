//! The `RecordStore` trait: the uniform collection contract every backend
//! implements.
//!
//! Higher layers (HTTP handlers, the hit-analysis pass, the migration tool)
//! depend on this abstraction, never on a concrete backend.
//!
//! Callers follow a read-modify-write cycle: load a whole collection, mutate
//! it in memory with the helpers in [`crate::document`], then save it back.
//! Two concurrent cycles on the same collection are last-write-wins.

use std::future::Future;

use crate::{
  analysis::HitAnalysis,
  document::Collection,
  model::{App, Dataset, Evaluation, Feedback, ModelConfig, OptimizationSuggestion},
  record::QueryRecord,
  stats::RequestStats,
};

/// Abstraction over a CIRL storage backend.
///
/// Reads return whole collections, newest first. Saves hand the backend the
/// whole collection; what happens to documents absent from the list is
/// documented per backend. Deleting a single document is always available
/// through [`RecordStore::delete`].
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Apps ──────────────────────────────────────────────────────────────

  fn read_apps(&self) -> impl Future<Output = Result<Vec<App>, Self::Error>> + Send + '_;

  fn save_apps<'a>(
    &'a self,
    apps: &'a [App],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Query records ─────────────────────────────────────────────────────

  fn read_query_records(
    &self,
  ) -> impl Future<Output = Result<Vec<QueryRecord>, Self::Error>> + Send + '_;

  fn save_query_records<'a>(
    &'a self,
    records: &'a [QueryRecord],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Feedbacks ─────────────────────────────────────────────────────────

  fn read_feedbacks(
    &self,
  ) -> impl Future<Output = Result<Vec<Feedback>, Self::Error>> + Send + '_;

  fn save_feedbacks<'a>(
    &'a self,
    feedbacks: &'a [Feedback],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Datasets ──────────────────────────────────────────────────────────

  fn read_datasets(
    &self,
  ) -> impl Future<Output = Result<Vec<Dataset>, Self::Error>> + Send + '_;

  fn save_datasets<'a>(
    &'a self,
    datasets: &'a [Dataset],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Hit analyses ──────────────────────────────────────────────────────

  fn read_hit_analyses(
    &self,
  ) -> impl Future<Output = Result<Vec<HitAnalysis>, Self::Error>> + Send + '_;

  fn save_hit_analyses<'a>(
    &'a self,
    analyses: &'a [HitAnalysis],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Evaluations ───────────────────────────────────────────────────────

  fn read_evaluations(
    &self,
  ) -> impl Future<Output = Result<Vec<Evaluation>, Self::Error>> + Send + '_;

  fn save_evaluations<'a>(
    &'a self,
    evaluations: &'a [Evaluation],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Optimization suggestions ──────────────────────────────────────────

  fn read_optimization_suggestions(
    &self,
  ) -> impl Future<Output = Result<Vec<OptimizationSuggestion>, Self::Error>> + Send + '_;

  fn save_optimization_suggestions<'a>(
    &'a self,
    suggestions: &'a [OptimizationSuggestion],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Models ────────────────────────────────────────────────────────────

  fn read_models(
    &self,
  ) -> impl Future<Output = Result<Vec<ModelConfig>, Self::Error>> + Send + '_;

  fn save_models<'a>(
    &'a self,
    models: &'a [ModelConfig],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Single-document removal ───────────────────────────────────────────

  /// Remove exactly one document by id. Returns `false` if no document with
  /// `id` existed in `collection`.
  fn delete<'a>(
    &'a self,
    collection: Collection,
    id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Stats ─────────────────────────────────────────────────────────────

  /// Rolling request counts and timelines per app over the query-record
  /// collection. An empty `app_ids` means every app with records.
  ///
  /// Results may be up to [`STATS_CACHE_TTL`](crate::stats::STATS_CACHE_TTL)
  /// stale.
  fn request_stats<'a>(
    &'a self,
    app_ids: &'a [String],
  ) -> impl Future<Output = Result<RequestStats, Self::Error>> + Send + 'a;

  // ── Lifecycle ─────────────────────────────────────────────────────────

  /// Flush everything pending to durable storage and release resources.
  /// The store must not be used afterwards.
  fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
