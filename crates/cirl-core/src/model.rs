//! Document types for the smaller collections.
//!
//! [`QueryRecord`](crate::record::QueryRecord) and
//! [`HitAnalysis`](crate::analysis::HitAnalysis) live in their own modules.
//!
//! Enum-like fields are real enums whose string forms match both the JSON
//! documents and the SQL `CHECK` constraints, so `as_ref()` / `parse()` is the
//! column encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  document::{generate_id, impl_document},
  timestamp,
};

// ─── App ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct App {
  pub id:          String,
  pub name:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata:    Option<Map<String, Value>>,
  #[serde(with = "timestamp")]
  pub created_at:  DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at:  DateTime<Utc>,
}

impl App {
  pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      id:          generate_id("app"),
      name:        name.into(),
      description: None,
      metadata:    None,
      created_at:  now,
      updated_at:  now,
    }
  }
}

impl_document!(App => App);

// ─── Feedback ────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackType {
  Positive,
  Negative,
  Neutral,
  Correction,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackStatus {
  #[default]
  Pending,
  Processed,
  Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Feedback {
  pub id:                      String,
  pub query_record_id:         String,
  #[serde(rename = "type")]
  pub kind:                    FeedbackType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content:                 Option<String>,
  /// 1 (worst) to 5 (best).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating:                  Option<u8>,
  /// The corrected answer when `kind` is [`FeedbackType::Correction`].
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub correction:              Option<String>,
  pub status:                  FeedbackStatus,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "timestamp::option"
  )]
  pub processed_at:            Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resolution:              Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub optimization_suggestion: Option<String>,
  #[serde(with = "timestamp")]
  pub created_at:              DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at:              DateTime<Utc>,
}

impl_document!(Feedback => Feedback);

// ─── Dataset ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Dataset {
  pub id:               String,
  pub app_id:           String,
  pub name:             String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description:      Option<String>,
  /// Member query records. A set semantically, kept in insertion order.
  #[serde(default)]
  pub query_record_ids: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata:         Option<Map<String, Value>>,
  #[serde(with = "timestamp")]
  pub created_at:       DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at:       DateTime<Utc>,
}

impl Dataset {
  pub fn new(
    app_id: impl Into<String>,
    name: impl Into<String>,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id:               generate_id("ds"),
      app_id:           app_id.into(),
      name:             name.into(),
      description:      None,
      query_record_ids: Vec::new(),
      metadata:         None,
      created_at:       now,
      updated_at:       now,
    }
  }

  /// Add a member unless it is already present. Returns whether it was added.
  pub fn add_member(&mut self, query_record_id: &str) -> bool {
    if self.query_record_ids.iter().any(|id| id == query_record_id) {
      return false;
    }
    self.query_record_ids.push(query_record_id.to_owned());
    true
  }
}

impl_document!(Dataset => Dataset);

// ─── Evaluation ──────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EvaluationType {
  Before,
  After,
}

/// Computed quality metrics of one evaluation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetrics {
  pub accuracy:        f64,
  /// Mean response time in milliseconds.
  pub speed:           f64,
  pub exact_hit_rate:  f64,
  pub high_hit_rate:   f64,
  pub medium_hit_rate: f64,
  pub no_hit_rate:     f64,
  pub avg_rating:      f64,
  pub feedback_count:  u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Evaluation {
  pub id:               String,
  pub app_id:           String,
  pub dataset_id:       String,
  pub evaluation_type:  EvaluationType,
  pub metrics:          EvaluationMetrics,
  #[serde(default)]
  pub query_record_ids: Vec<String>,
  #[serde(with = "timestamp")]
  pub evaluated_at:     DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub created_at:       DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at:       DateTime<Utc>,
}

impl_document!(Evaluation => Evaluation);

// ─── OptimizationSuggestion ──────────────────────────────────────────────────

/// Which kind of entity a suggestion was derived from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SuggestionSource {
  Feedback,
  HitAnalysis,
  Evaluation,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
  High,
  Medium,
  Low,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SuggestionStatus {
  #[default]
  Pending,
  Applied,
  Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OptimizationSuggestion {
  pub id:         String,
  pub app_id:     String,
  pub source:     SuggestionSource,
  /// Id of the feedback, hit analysis or evaluation named by `source`.
  pub source_id:  String,
  pub priority:   Priority,
  pub content:    String,
  pub status:     SuggestionStatus,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "timestamp::option"
  )]
  pub applied_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result:     Option<String>,
  #[serde(with = "timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at: DateTime<Utc>,
}

impl_document!(OptimizationSuggestion => OptimizationSuggestion);

// ─── ModelConfig ─────────────────────────────────────────────────────────────

/// Connection settings for one upstream model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelConfig {
  pub id:         String,
  pub name:       String,
  pub provider:   String,
  #[serde(default)]
  pub base_url:   String,
  #[serde(default)]
  pub api_key:    String,
  pub model:      String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata:   Option<Map<String, Value>>,
  #[serde(with = "timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at: DateTime<Utc>,
}

impl_document!(ModelConfig => ModelConfig);
