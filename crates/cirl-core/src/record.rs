//! Query records: one logged input/output exchange of an app.
//!
//! This is the highest-volume collection and the input of the stats engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  analysis::{MatchSummary, MatchType},
  document::{generate_id, impl_document},
  stats::Window,
  timestamp,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryRecord {
  pub id:         String,
  pub app_id:     String,
  pub input:      String,
  pub output:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model_id:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub context:    Option<Map<String, Value>>,
  /// Part of the app's curated answer library.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub curated:    Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags:       Option<Vec<String>>,
  /// Excluded from stats and analysis.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ignored:    Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata:   Option<QueryRecordMetadata>,
  #[serde(with = "timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at: DateTime<Utc>,
}

impl QueryRecord {
  pub fn new(
    app_id: impl Into<String>,
    input: impl Into<String>,
    output: impl Into<String>,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id:         generate_id("qr"),
      app_id:     app_id.into(),
      input:      input.into(),
      output:     output.into(),
      model_id:   None,
      context:    None,
      curated:    None,
      tags:       None,
      ignored:    None,
      metadata:   None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_curated(&self) -> bool { self.curated.unwrap_or(false) }

  pub fn is_ignored(&self) -> bool { self.ignored.unwrap_or(false) }

  pub fn metadata_mut(&mut self) -> &mut QueryRecordMetadata {
    self.metadata.get_or_insert_with(QueryRecordMetadata::default)
  }
}

impl_document!(QueryRecord => QueryRecord);

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Nested metadata of a query record.
///
/// The known keys are typed; anything else is carried through untouched in
/// `extra` so documents written by other tools round-trip without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecordMetadata {
  /// Upstream response time in milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response_time:          Option<f64>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "timestamp::option"
  )]
  pub last_analyzed_at:       Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_match_type:        Option<MatchType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_similarity:        Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_analysis_range:    Option<Window>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_analysis_model_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_matched_record_id: Option<String>,
  /// Per-range hit tallies for a curated record, keyed by range label.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hit_snapshots:          Option<BTreeMap<String, HitSnapshot>>,
  #[serde(flatten)]
  pub extra:                  Map<String, Value>,
}

impl QueryRecordMetadata {
  /// Record the outcome of one analysis of this record. Optional inputs that
  /// are `None` leave the previous value in place.
  pub fn record_analysis(
    &mut self,
    match_type: MatchType,
    similarity: f64,
    analyzed_at: DateTime<Utc>,
    range: Window,
    model_id: Option<&str>,
    matched_record_id: Option<&str>,
  ) {
    self.last_analyzed_at = Some(analyzed_at);
    self.last_match_type = Some(match_type);
    self.last_similarity = Some(similarity);
    self.last_analysis_range = Some(range);
    if let Some(model_id) = model_id {
      self.last_analysis_model_id = Some(model_id.to_owned());
    }
    if let Some(matched) = matched_record_id {
      self.last_matched_record_id = Some(matched.to_owned());
    }
  }
}

/// How often a curated record was matched during one analysis range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitSnapshot {
  #[serde(flatten)]
  pub summary:         MatchSummary,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "timestamp::option"
  )]
  pub last_matched_at: Option<DateTime<Utc>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "timestamp::option"
  )]
  pub updated_at:      Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn absent_flags_stay_absent() {
    let raw = json!({
      "id": "qr_1",
      "appId": "app_1",
      "input": "x",
      "output": "y",
      "createdAt": "2024-01-01T00:00:00.000Z",
      "updatedAt": "2024-01-01T00:00:00.000Z"
    });
    let record: QueryRecord = serde_json::from_value(raw.clone()).unwrap();
    assert!(!record.is_curated());
    assert!(!record.is_ignored());
    assert_eq!(serde_json::to_value(&record).unwrap(), raw);
  }

  #[test]
  fn explicit_false_round_trips_as_boolean() {
    let raw = json!({
      "id": "qr_1",
      "appId": "app_1",
      "input": "x",
      "output": "y",
      "curated": false,
      "ignored": false,
      "tags": ["a", "b"],
      "createdAt": "2024-01-01T00:00:00.000Z",
      "updatedAt": "2024-01-01T00:00:00.000Z"
    });
    let record: QueryRecord = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(record.curated, Some(false));
    assert_eq!(serde_json::to_value(&record).unwrap(), raw);
  }

  #[test]
  fn metadata_keeps_unknown_keys() {
    let raw = json!({
      "responseTime": 120.5,
      "lastMatchType": "high",
      "lastAnalysisRange": "7d",
      "hitSnapshots": {
        "24h": {
          "exact": 1, "high": 0, "medium": 0, "none": 0, "total": 1,
          "updatedAt": "2024-01-01T00:00:00.000Z"
        }
      },
      "source": "import"
    });
    let metadata: QueryRecordMetadata = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(metadata.last_match_type, Some(MatchType::High));
    assert_eq!(metadata.last_analysis_range, Some(Window::Week));
    assert_eq!(metadata.extra.get("source"), Some(&json!("import")));
    assert_eq!(metadata.hit_snapshots.as_ref().unwrap()["24h"].summary.exact, 1);
    assert_eq!(serde_json::to_value(&metadata).unwrap(), raw);
  }

  #[test]
  fn record_analysis_keeps_previous_optional_values() {
    let mut metadata = QueryRecordMetadata {
      last_matched_record_id: Some("qr_old".into()),
      ..Default::default()
    };
    metadata.record_analysis(
      MatchType::Miss,
      12.0,
      Utc::now(),
      Window::Day,
      None,
      None,
    );
    assert_eq!(metadata.last_match_type, Some(MatchType::Miss));
    assert_eq!(metadata.last_matched_record_id.as_deref(), Some("qr_old"));
  }
}
