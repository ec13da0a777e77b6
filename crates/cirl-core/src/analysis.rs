//! Hit analysis: how well an app's curated answer library covers the
//! questions it actually receives.
//!
//! Each uncurated record in a range is compared against every curated record
//! of the same app; the best similarity decides its [`MatchType`]. Results are
//! stored as [`HitAnalysis`] documents and mirrored into record metadata.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
  Error, Result,
  document::{Collection, Document, generate_id},
  record::HitSnapshot,
  stats::Window,
  store::RecordStore,
  timestamp,
};

// ─── Match classification ────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchType {
  Exact,
  High,
  Medium,
  /// No curated record was close enough.
  #[serde(rename = "none")]
  #[strum(serialize = "none")]
  Miss,
}

impl MatchType {
  /// Classify a similarity score in `0..=100`. Boundaries are inclusive.
  pub fn from_similarity(similarity: f64) -> Self {
    if similarity >= 100.0 {
      Self::Exact
    } else if similarity >= 80.0 {
      Self::High
    } else if similarity >= 60.0 {
      Self::Medium
    } else {
      Self::Miss
    }
  }
}

/// Tally of match types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
  #[serde(default)]
  pub exact:  u64,
  #[serde(default)]
  pub high:   u64,
  #[serde(default)]
  pub medium: u64,
  #[serde(default)]
  pub none:   u64,
  #[serde(default)]
  pub total:  u64,
}

impl MatchSummary {
  pub fn record(&mut self, match_type: MatchType) {
    match match_type {
      MatchType::Exact => self.exact += 1,
      MatchType::High => self.high += 1,
      MatchType::Medium => self.medium += 1,
      MatchType::Miss => self.none += 1,
    }
    self.total += 1;
  }
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HitAnalysis {
  pub id:                      String,
  pub query_record_id:         String,
  /// A dataset id, or an analysis scope such as `qa_library:<appId>`.
  pub dataset_id:              String,
  pub match_type:              MatchType,
  pub similarity:              f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matched_query_record_id: Option<String>,
  /// Usually an object `{range, modelId, appId}`; older documents may hold
  /// the same object encoded as a string.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub analysis_result:         Option<Value>,
  #[serde(with = "timestamp")]
  pub created_at:              DateTime<Utc>,
}

impl HitAnalysis {
  pub fn scope(&self) -> AnalysisScope {
    AnalysisScope::from_result(self.analysis_result.as_ref())
  }
}

impl Document for HitAnalysis {
  const COLLECTION: Collection = Collection::HitAnalysis;

  fn id(&self) -> &str { &self.id }

  fn created_at(&self) -> DateTime<Utc> { self.created_at }

  fn touch(&mut self, _now: DateTime<Utc>) {}
}

/// The run parameters recorded in [`HitAnalysis::analysis_result`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisScope {
  pub range:    Option<Window>,
  pub app_id:   Option<String>,
  pub model_id: Option<String>,
}

impl AnalysisScope {
  /// Parse leniently: anything unreadable yields an empty scope.
  pub fn from_result(value: Option<&Value>) -> Self {
    match value {
      Some(object @ Value::Object(_)) => Self::deserialize(object).unwrap_or_default(),
      Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_default(),
      _ => Self::default(),
    }
  }
}

/// Parse an analysis range label (`24h`, `7d`, `30d`).
pub fn parse_range(label: &str) -> Result<Window> {
  label
    .parse()
    .map_err(|_| Error::Validation(format!("invalid time range: {label:?}")))
}

/// Drop analyses superseded by a new run over `source_ids` for `range` and
/// `app_id`, so a rerun replaces rather than double-counts.
pub fn retain_analyses(
  existing: Vec<HitAnalysis>,
  source_ids: &HashSet<String>,
  range: Window,
  app_id: &str,
) -> Vec<HitAnalysis> {
  existing
    .into_iter()
    .filter(|analysis| {
      if !source_ids.contains(&analysis.query_record_id) {
        return true;
      }
      let scope = analysis.scope();
      scope.range != Some(range) || scope.app_id.as_deref() != Some(app_id)
    })
    .collect()
}

// ─── Run ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HitAnalysisRequest {
  pub app_id:   String,
  pub range:    Window,
  pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitAnalysisReport {
  pub count:      usize,
  pub analyses:   Vec<HitAnalysis>,
  pub summary:    MatchSummary,
  pub range:      Window,
  #[serde(with = "timestamp")]
  pub start_date: DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub end_date:   DateTime<Utc>,
}

/// Analyse the app's records in `request.range` against its curated library.
///
/// `similarity` scores two inputs on a `0..=100` scale. Analyses from an
/// earlier run over the same records, range and app are replaced.
pub async fn run_hit_analysis<S: RecordStore>(
  store: &S,
  request: &HitAnalysisRequest,
  similarity: impl Fn(&str, &str) -> f64,
) -> Result<HitAnalysisReport, S::Error> {
  let now = Utc::now();
  let start_date = now - request.range.duration();
  let app_id = request.app_id.as_str();

  let mut records = store.read_query_records().await?;

  let source_idx: Vec<usize> = records
    .iter()
    .enumerate()
    .filter(|(_, r)| {
      r.app_id == app_id && !r.is_curated() && !r.is_ignored() && r.created_at >= start_date
    })
    .map(|(i, _)| i)
    .collect();
  let curated_idx: Vec<usize> = records
    .iter()
    .enumerate()
    .filter(|(_, r)| r.app_id == app_id && r.is_curated())
    .map(|(i, _)| i)
    .collect();

  let mut report = HitAnalysisReport {
    count: 0,
    analyses: Vec::new(),
    summary: MatchSummary::default(),
    range: request.range,
    start_date,
    end_date: now,
  };

  if source_idx.is_empty() || curated_idx.is_empty() {
    report.summary.none = source_idx.len() as u64;
    report.summary.total = source_idx.len() as u64;
    return Ok(report);
  }

  let source_ids: HashSet<String> =
    source_idx.iter().map(|&i| records[i].id.clone()).collect();
  let retained =
    retain_analyses(store.read_hit_analyses().await?, &source_ids, request.range, app_id);

  let analysis_result = json!({
    "range": request.range,
    "modelId": request.model_id,
    "appId": app_id,
  });
  let mut snapshots: HashMap<String, HitSnapshot> = HashMap::new();

  for &i in &source_idx {
    let mut best = 0.0;
    let mut matched: Option<String> = None;
    for &c in &curated_idx {
      let score = similarity(&records[i].input, &records[c].input);
      if score > best {
        best = score;
        matched = Some(records[c].id.clone());
      }
    }

    let match_type = MatchType::from_similarity(best);
    let analyzed_at = Utc::now();
    report.summary.record(match_type);

    let record = &mut records[i];
    report.analyses.push(HitAnalysis {
      id:                      generate_id("ha"),
      query_record_id:         record.id.clone(),
      dataset_id:              format!("qa_library:{app_id}"),
      match_type,
      similarity:              best,
      matched_query_record_id: matched.clone(),
      analysis_result:         Some(analysis_result.clone()),
      created_at:              analyzed_at,
    });
    record.metadata_mut().record_analysis(
      match_type,
      best,
      analyzed_at,
      request.range,
      request.model_id.as_deref(),
      matched.as_deref(),
    );

    if let Some(target) = matched {
      let snapshot = snapshots.entry(target).or_default();
      snapshot.summary.record(match_type);
      snapshot.last_matched_at = Some(analyzed_at);
    }
  }

  for &c in &curated_idx {
    let record = &mut records[c];
    let Some(mut snapshot) = snapshots.remove(&record.id) else {
      continue;
    };
    snapshot.updated_at = Some(Utc::now());
    record
      .metadata_mut()
      .hit_snapshots
      .get_or_insert_with(Default::default)
      .insert(request.range.to_string(), snapshot);
  }

  report.count = report.analyses.len();

  let mut all = retained;
  all.extend(report.analyses.iter().cloned());
  store.save_hit_analyses(&all).await?;
  store.save_query_records(&records).await?;

  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn match_type_boundaries_are_inclusive() {
    assert_eq!(MatchType::from_similarity(100.0), MatchType::Exact);
    assert_eq!(MatchType::from_similarity(80.0), MatchType::High);
    assert_eq!(MatchType::from_similarity(79.9999), MatchType::Medium);
    assert_eq!(MatchType::from_similarity(60.0), MatchType::Medium);
    assert_eq!(MatchType::from_similarity(59.9), MatchType::Miss);
    assert_eq!(MatchType::from_similarity(0.0), MatchType::Miss);
    assert_eq!(MatchType::from_similarity(f64::NAN), MatchType::Miss);
  }

  #[test]
  fn miss_is_named_none() {
    assert_eq!(serde_json::to_value(MatchType::Miss).unwrap(), json!("none"));
    assert_eq!(MatchType::Miss.as_ref(), "none");
    assert_eq!("none".parse::<MatchType>().unwrap(), MatchType::Miss);
  }

  #[test]
  fn unknown_range_is_a_validation_error() {
    assert_eq!(parse_range("7d").unwrap(), Window::Week);
    assert!(matches!(parse_range("1y"), Err(Error::Validation(_))));
  }

  #[test]
  fn scope_parses_objects_and_encoded_strings() {
    let object = json!({ "range": "24h", "appId": "app_1", "modelId": null });
    let scope = AnalysisScope::from_result(Some(&object));
    assert_eq!(scope.range, Some(Window::Day));
    assert_eq!(scope.app_id.as_deref(), Some("app_1"));

    let encoded = Value::String(object.to_string());
    assert_eq!(AnalysisScope::from_result(Some(&encoded)), scope);

    let garbage = Value::String("not json".into());
    assert_eq!(AnalysisScope::from_result(Some(&garbage)), AnalysisScope::default());
  }

  fn analysis(id: &str, record: &str, result: Option<Value>) -> HitAnalysis {
    HitAnalysis {
      id:                      id.into(),
      query_record_id:         record.into(),
      dataset_id:              "qa_library:app_1".into(),
      match_type:              MatchType::High,
      similarity:              85.0,
      matched_query_record_id: None,
      analysis_result:         result,
      created_at:              Utc::now(),
    }
  }

  #[test]
  fn retain_drops_only_same_scope_for_source_records() {
    let existing = vec![
      analysis("ha_1", "qr_1", Some(json!({ "range": "24h", "appId": "app_1" }))),
      analysis("ha_2", "qr_1", Some(json!({ "range": "7d", "appId": "app_1" }))),
      analysis("ha_3", "qr_2", Some(json!({ "range": "24h", "appId": "app_1" }))),
      analysis("ha_4", "qr_1", None),
    ];
    let source_ids = HashSet::from(["qr_1".to_owned()]);

    let kept = retain_analyses(existing, &source_ids, Window::Day, "app_1");
    let ids: Vec<_> = kept.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["ha_2", "ha_3", "ha_4"]);
  }

  #[test]
  fn summary_tallies_every_type() {
    let mut summary = MatchSummary::default();
    for t in [MatchType::Exact, MatchType::Miss, MatchType::Miss] {
      summary.record(t);
    }
    assert_eq!(summary, MatchSummary { exact: 1, none: 2, total: 3, ..Default::default() });
  }
}
