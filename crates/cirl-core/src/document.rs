//! The [`Document`] abstraction shared by every collection, plus the
//! lifecycle helpers callers use for read-modify-write cycles.
//!
//! Documents are created with a fresh id and timestamp, updated by a shallow
//! field merge that always refreshes `updatedAt`, and removed by id. A miss
//! is reported as `None`, never as an error, so callers can choose their own
//! not-found handling.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Collections ─────────────────────────────────────────────────────────────

/// The eight logical collections managed by a store.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  strum::Display,
  strum::EnumIter,
  strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
  App,
  QueryRecord,
  Feedback,
  Dataset,
  HitAnalysis,
  Evaluation,
  OptimizationSuggestion,
  ModelConfig,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A document stored in one of the [`Collection`]s.
pub trait Document:
  Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
  const COLLECTION: Collection;

  fn id(&self) -> &str;

  fn created_at(&self) -> DateTime<Utc>;

  /// Refresh `updatedAt`. A no-op for collections without one.
  fn touch(&mut self, now: DateTime<Utc>);
}

/// Implement [`Document`] for a struct with `id`, `created_at` and
/// `updated_at` fields.
macro_rules! impl_document {
  ($ty:ty => $collection:ident) => {
    impl $crate::document::Document for $ty {
      const COLLECTION: $crate::document::Collection =
        $crate::document::Collection::$collection;

      fn id(&self) -> &str { &self.id }

      fn created_at(&self) -> ::chrono::DateTime<::chrono::Utc> { self.created_at }

      fn touch(&mut self, now: ::chrono::DateTime<::chrono::Utc>) {
        self.updated_at = now;
      }
    }
  };
}

pub(crate) use impl_document;

// ─── Lifecycle helpers ───────────────────────────────────────────────────────

/// Generate a fresh document id of the form `<prefix>_<32 hex digits>`.
pub fn generate_id(prefix: &str) -> String {
  format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Shallow-merge `patch` over `doc`.
///
/// Top-level fields present in `patch` overwrite those of `doc`; `id` and
/// `createdAt` are immutable and silently kept. `updatedAt` is set to `now`
/// regardless of the patch. Unknown fields and type mismatches are rejected.
pub fn merge_patch<D: Document>(
  doc: &D,
  patch: &Map<String, Value>,
  now: DateTime<Utc>,
) -> Result<D> {
  let Value::Object(mut fields) = serde_json::to_value(doc)? else {
    return Err(Error::Validation(format!(
      "{} documents must serialize to JSON objects",
      D::COLLECTION
    )));
  };

  for (key, value) in patch {
    if key == "id" || key == "createdAt" {
      continue;
    }
    fields.insert(key.clone(), value.clone());
  }

  let mut merged: D = serde_json::from_value(Value::Object(fields))?;
  merged.touch(now);
  Ok(merged)
}

pub fn find_by_id<'a, D: Document>(items: &'a [D], id: &str) -> Option<&'a D> {
  items.iter().find(|doc| doc.id() == id)
}

/// Apply [`merge_patch`] to the document with `id` in place.
///
/// Returns `Ok(None)` if no such document exists.
pub fn update_by_id<'a, D: Document>(
  items: &'a mut [D],
  id: &str,
  patch: &Map<String, Value>,
  now: DateTime<Utc>,
) -> Result<Option<&'a D>> {
  let Some(slot) = items.iter_mut().find(|doc| doc.id() == id) else {
    return Ok(None);
  };
  *slot = merge_patch(slot, patch, now)?;
  Ok(Some(slot))
}

/// Remove exactly one document by id, returning it.
pub fn remove_by_id<D: Document>(items: &mut Vec<D>, id: &str) -> Option<D> {
  let index = items.iter().position(|doc| doc.id() == id)?;
  Some(items.remove(index))
}

/// Stable sort, most recently created first.
pub fn sort_newest_first<D: Document>(items: &mut [D]) {
  items.sort_by_key(|doc| std::cmp::Reverse(doc.created_at()));
}
