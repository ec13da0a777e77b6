//! Encoding and decoding between CIRL documents and SQLite rows.
//!
//! Timestamps are stored in the canonical `timestamp` text form so they sort
//! chronologically and feed `strftime` directly. Optional booleans are
//! `0`/`1`/`NULL`. Nested objects and arrays are compact JSON text. Enums are
//! stored as the same lowercase names they use in JSON.

use std::{collections::HashMap, str::FromStr};

use chrono::{DateTime, Utc};
use rusqlite::{Row, types::Value as SqlValue};
use serde::{Serialize, de::DeserializeOwned};

use cirl_core::{
  analysis::HitAnalysis,
  document::Collection,
  model::{App, Dataset, Evaluation, Feedback, ModelConfig, OptimizationSuggestion},
  record::QueryRecord,
  timestamp,
};

use crate::{Error, Result};

// ─── Statements ──────────────────────────────────────────────────────────────

/// One parameterized statement of a write batch.
#[derive(Debug, Clone)]
pub struct Statement {
  pub sql:    String,
  pub params: Vec<SqlValue>,
}

impl Statement {
  pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
    Self { sql: sql.into(), params }
  }
}

pub fn table(collection: Collection) -> &'static str {
  match collection {
    Collection::App => "apps",
    Collection::QueryRecord => "query_records",
    Collection::Feedback => "feedbacks",
    Collection::Dataset => "datasets",
    Collection::HitAnalysis => "hit_analyses",
    Collection::Evaluation => "evaluations",
    Collection::OptimizationSuggestion => "optimization_suggestions",
    Collection::ModelConfig => "models",
  }
}

/// Delete every row of `collection` whose id is not in `ids`.
///
/// The id set travels as one JSON array parameter, so the statement does not
/// grow with the collection.
pub fn prune<'a>(
  collection: Collection,
  ids: impl IntoIterator<Item = &'a str>,
) -> Result<Statement> {
  let ids: Vec<&str> = ids.into_iter().collect();
  Ok(Statement::new(
    format!(
      "DELETE FROM {} WHERE id NOT IN (SELECT value FROM json_each(?1))",
      table(collection)
    ),
    vec![SqlValue::Text(serde_json::to_string(&ids)?)],
  ))
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

fn text(value: &str) -> SqlValue { SqlValue::Text(value.to_owned()) }

fn opt_text(value: Option<&str>) -> SqlValue {
  value.map_or(SqlValue::Null, text)
}

pub fn encode_dt(at: DateTime<Utc>) -> SqlValue { SqlValue::Text(timestamp::format(&at)) }

fn encode_opt_dt(at: Option<DateTime<Utc>>) -> SqlValue {
  at.map_or(SqlValue::Null, encode_dt)
}

pub fn decode_dt(raw: &str) -> Result<DateTime<Utc>> {
  timestamp::parse(raw).map_err(|e| Error::Decode(format!("timestamp {raw:?}: {e}")))
}

fn decode_opt_dt(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
  raw.as_deref().map(decode_dt).transpose()
}

fn encode_bool(value: Option<bool>) -> SqlValue {
  value.map_or(SqlValue::Null, |b| SqlValue::Integer(i64::from(b)))
}

fn decode_bool(value: Option<i64>) -> Option<bool> { value.map(|v| v != 0) }

fn encode_json<T: Serialize + ?Sized>(value: Option<&T>) -> Result<SqlValue> {
  Ok(match value {
    Some(value) => SqlValue::Text(serde_json::to_string(value)?),
    None => SqlValue::Null,
  })
}

fn decode_json<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
  Ok(raw.as_deref().map(serde_json::from_str::<T>).transpose()?)
}

fn decode_enum<E: FromStr>(column: &str, raw: &str) -> Result<E> {
  raw
    .parse()
    .map_err(|_| Error::Decode(format!("unknown {column}: {raw:?}")))
}

/// Empty strings are stored as `NULL` and read back as empty.
fn encode_non_empty(value: &str) -> SqlValue {
  if value.is_empty() { SqlValue::Null } else { text(value) }
}

// ─── Apps ────────────────────────────────────────────────────────────────────

pub const SELECT_APPS: &str = "
SELECT id, name, description, metadata, created_at, updated_at
FROM apps ORDER BY created_at DESC";

pub struct RawApp {
  pub id:          String,
  pub name:        String,
  pub description: Option<String>,
  pub metadata:    Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawApp {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      name:        row.get(1)?,
      description: row.get(2)?,
      metadata:    row.get(3)?,
      created_at:  row.get(4)?,
      updated_at:  row.get(5)?,
    })
  }

  pub fn into_app(self) -> Result<App> {
    Ok(App {
      id:          self.id,
      name:        self.name,
      description: self.description,
      metadata:    decode_json(self.metadata)?,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub fn upsert_app(app: &App) -> Result<Statement> {
  Ok(Statement::new(
    "INSERT INTO apps (id, name, description, metadata, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(id) DO UPDATE SET
       name = excluded.name,
       description = excluded.description,
       metadata = excluded.metadata,
       created_at = excluded.created_at,
       updated_at = excluded.updated_at",
    vec![
      text(&app.id),
      text(&app.name),
      opt_text(app.description.as_deref()),
      encode_json(app.metadata.as_ref())?,
      encode_dt(app.created_at),
      encode_dt(app.updated_at),
    ],
  ))
}

// ─── Query records ───────────────────────────────────────────────────────────

pub const SELECT_QUERY_RECORDS: &str = "
SELECT id, app_id, input, output, model_id, context, curated, tags, ignored,
       metadata, created_at, updated_at
FROM query_records ORDER BY created_at DESC";

pub struct RawQueryRecord {
  pub id:         String,
  pub app_id:     String,
  pub input:      String,
  pub output:     String,
  pub model_id:   Option<String>,
  pub context:    Option<String>,
  pub curated:    Option<i64>,
  pub tags:       Option<String>,
  pub ignored:    Option<i64>,
  pub metadata:   Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawQueryRecord {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      app_id:     row.get(1)?,
      input:      row.get(2)?,
      output:     row.get(3)?,
      model_id:   row.get(4)?,
      context:    row.get(5)?,
      curated:    row.get(6)?,
      tags:       row.get(7)?,
      ignored:    row.get(8)?,
      metadata:   row.get(9)?,
      created_at: row.get(10)?,
      updated_at: row.get(11)?,
    })
  }

  pub fn into_query_record(self) -> Result<QueryRecord> {
    Ok(QueryRecord {
      id:         self.id,
      app_id:     self.app_id,
      input:      self.input,
      output:     self.output,
      model_id:   self.model_id,
      context:    decode_json(self.context)?,
      curated:    decode_bool(self.curated),
      tags:       decode_json(self.tags)?,
      ignored:    decode_bool(self.ignored),
      metadata:   decode_json(self.metadata)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub fn upsert_query_record(record: &QueryRecord) -> Result<Statement> {
  Ok(Statement::new(
    "INSERT INTO query_records (
       id, app_id, input, output, model_id, context, curated, tags, ignored,
       metadata, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
     ON CONFLICT(id) DO UPDATE SET
       app_id = excluded.app_id,
       input = excluded.input,
       output = excluded.output,
       model_id = excluded.model_id,
       context = excluded.context,
       curated = excluded.curated,
       tags = excluded.tags,
       ignored = excluded.ignored,
       metadata = excluded.metadata,
       created_at = excluded.created_at,
       updated_at = excluded.updated_at",
    vec![
      text(&record.id),
      text(&record.app_id),
      text(&record.input),
      text(&record.output),
      opt_text(record.model_id.as_deref()),
      encode_json(record.context.as_ref())?,
      encode_bool(record.curated),
      encode_json(record.tags.as_ref())?,
      encode_bool(record.ignored),
      encode_json(record.metadata.as_ref())?,
      encode_dt(record.created_at),
      encode_dt(record.updated_at),
    ],
  ))
}

// ─── Feedbacks ───────────────────────────────────────────────────────────────

pub const SELECT_FEEDBACKS: &str = "
SELECT id, query_record_id, type, content, rating, correction, status,
       processed_at, resolution, optimization_suggestion, created_at, updated_at
FROM feedbacks ORDER BY created_at DESC";

pub struct RawFeedback {
  pub id:                      String,
  pub query_record_id:         String,
  pub kind:                    String,
  pub content:                 Option<String>,
  pub rating:                  Option<i64>,
  pub correction:              Option<String>,
  pub status:                  String,
  pub processed_at:            Option<String>,
  pub resolution:              Option<String>,
  pub optimization_suggestion: Option<String>,
  pub created_at:              String,
  pub updated_at:              String,
}

impl RawFeedback {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                      row.get(0)?,
      query_record_id:         row.get(1)?,
      kind:                    row.get(2)?,
      content:                 row.get(3)?,
      rating:                  row.get(4)?,
      correction:              row.get(5)?,
      status:                  row.get(6)?,
      processed_at:            row.get(7)?,
      resolution:              row.get(8)?,
      optimization_suggestion: row.get(9)?,
      created_at:              row.get(10)?,
      updated_at:              row.get(11)?,
    })
  }

  pub fn into_feedback(self) -> Result<Feedback> {
    let rating = self
      .rating
      .map(|r| u8::try_from(r).map_err(|_| Error::Decode(format!("rating out of range: {r}"))))
      .transpose()?;

    Ok(Feedback {
      id: self.id,
      query_record_id: self.query_record_id,
      kind: decode_enum("feedback type", &self.kind)?,
      content: self.content,
      rating,
      correction: self.correction,
      status: decode_enum("feedback status", &self.status)?,
      processed_at: decode_opt_dt(self.processed_at)?,
      resolution: self.resolution,
      optimization_suggestion: self.optimization_suggestion,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub fn upsert_feedback(feedback: &Feedback) -> Statement {
  Statement::new(
    "INSERT INTO feedbacks (
       id, query_record_id, type, content, rating, correction, status,
       processed_at, resolution, optimization_suggestion, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
     ON CONFLICT(id) DO UPDATE SET
       query_record_id = excluded.query_record_id,
       type = excluded.type,
       content = excluded.content,
       rating = excluded.rating,
       correction = excluded.correction,
       status = excluded.status,
       processed_at = excluded.processed_at,
       resolution = excluded.resolution,
       optimization_suggestion = excluded.optimization_suggestion,
       created_at = excluded.created_at,
       updated_at = excluded.updated_at",
    vec![
      text(&feedback.id),
      text(&feedback.query_record_id),
      text(feedback.kind.as_ref()),
      opt_text(feedback.content.as_deref()),
      feedback.rating.map_or(SqlValue::Null, |r| SqlValue::Integer(i64::from(r))),
      opt_text(feedback.correction.as_deref()),
      text(feedback.status.as_ref()),
      encode_opt_dt(feedback.processed_at),
      opt_text(feedback.resolution.as_deref()),
      opt_text(feedback.optimization_suggestion.as_deref()),
      encode_dt(feedback.created_at),
      encode_dt(feedback.updated_at),
    ],
  )
}

// ─── Datasets ────────────────────────────────────────────────────────────────

pub const SELECT_DATASETS: &str = "
SELECT id, app_id, name, description, metadata, created_at, updated_at
FROM datasets ORDER BY created_at DESC";

pub const SELECT_DATASET_MEMBERS: &str = "
SELECT dataset_id, query_record_id FROM dataset_query_records
ORDER BY dataset_id, position";

pub struct RawDataset {
  pub id:          String,
  pub app_id:      String,
  pub name:        String,
  pub description: Option<String>,
  pub metadata:    Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawDataset {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      app_id:      row.get(1)?,
      name:        row.get(2)?,
      description: row.get(3)?,
      metadata:    row.get(4)?,
      created_at:  row.get(5)?,
      updated_at:  row.get(6)?,
    })
  }

  pub fn into_dataset(self, members: &mut Members) -> Result<Dataset> {
    Ok(Dataset {
      query_record_ids: members.remove(&self.id).unwrap_or_default(),
      id:               self.id,
      app_id:           self.app_id,
      name:             self.name,
      description:      self.description,
      metadata:         decode_json(self.metadata)?,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

/// Ordered join-table membership keyed by owner id.
pub type Members = HashMap<String, Vec<String>>;

pub fn collect_members(pairs: Vec<(String, String)>) -> Members {
  let mut members = Members::new();
  for (owner, member) in pairs {
    members.entry(owner).or_default().push(member);
  }
  members
}

/// Upsert a dataset and replace its membership rows.
pub fn write_dataset(dataset: &Dataset, out: &mut Vec<Statement>) -> Result<()> {
  out.push(Statement::new(
    "INSERT INTO datasets (id, app_id, name, description, metadata, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(id) DO UPDATE SET
       app_id = excluded.app_id,
       name = excluded.name,
       description = excluded.description,
       metadata = excluded.metadata,
       created_at = excluded.created_at,
       updated_at = excluded.updated_at",
    vec![
      text(&dataset.id),
      text(&dataset.app_id),
      text(&dataset.name),
      opt_text(dataset.description.as_deref()),
      encode_json(dataset.metadata.as_ref())?,
      encode_dt(dataset.created_at),
      encode_dt(dataset.updated_at),
    ],
  ));
  out.push(Statement::new(
    "DELETE FROM dataset_query_records WHERE dataset_id = ?1",
    vec![text(&dataset.id)],
  ));
  for (position, member) in dataset.query_record_ids.iter().enumerate() {
    out.push(Statement::new(
      "INSERT OR IGNORE INTO dataset_query_records (dataset_id, query_record_id, position)
       VALUES (?1, ?2, ?3)",
      vec![text(&dataset.id), text(member), SqlValue::Integer(position as i64)],
    ));
  }
  Ok(())
}

// ─── Hit analyses ────────────────────────────────────────────────────────────

pub const SELECT_HIT_ANALYSES: &str = "
SELECT id, query_record_id, dataset_id, match_type, similarity,
       matched_query_record_id, analysis_result, created_at
FROM hit_analyses ORDER BY created_at DESC";

pub struct RawHitAnalysis {
  pub id:                      String,
  pub query_record_id:         String,
  pub dataset_id:              String,
  pub match_type:              String,
  pub similarity:              f64,
  pub matched_query_record_id: Option<String>,
  pub analysis_result:         Option<String>,
  pub created_at:              String,
}

impl RawHitAnalysis {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                      row.get(0)?,
      query_record_id:         row.get(1)?,
      dataset_id:              row.get(2)?,
      match_type:              row.get(3)?,
      similarity:              row.get(4)?,
      matched_query_record_id: row.get(5)?,
      analysis_result:         row.get(6)?,
      created_at:              row.get(7)?,
    })
  }

  pub fn into_hit_analysis(self) -> Result<HitAnalysis> {
    // Text that is not valid JSON was stored raw and reads back as a string.
    let analysis_result = self.analysis_result.map(|raw| {
      serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    });

    Ok(HitAnalysis {
      id: self.id,
      query_record_id: self.query_record_id,
      dataset_id: self.dataset_id,
      match_type: decode_enum("match type", &self.match_type)?,
      similarity: self.similarity,
      matched_query_record_id: self.matched_query_record_id,
      analysis_result,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub fn upsert_hit_analysis(analysis: &HitAnalysis) -> Result<Statement> {
  Ok(Statement::new(
    "INSERT INTO hit_analyses (
       id, query_record_id, dataset_id, match_type, similarity,
       matched_query_record_id, analysis_result, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT(id) DO UPDATE SET
       query_record_id = excluded.query_record_id,
       dataset_id = excluded.dataset_id,
       match_type = excluded.match_type,
       similarity = excluded.similarity,
       matched_query_record_id = excluded.matched_query_record_id,
       analysis_result = excluded.analysis_result,
       created_at = excluded.created_at",
    vec![
      text(&analysis.id),
      text(&analysis.query_record_id),
      text(&analysis.dataset_id),
      text(analysis.match_type.as_ref()),
      SqlValue::Real(analysis.similarity),
      opt_text(analysis.matched_query_record_id.as_deref()),
      encode_json(analysis.analysis_result.as_ref())?,
      encode_dt(analysis.created_at),
    ],
  ))
}

// ─── Evaluations ─────────────────────────────────────────────────────────────

pub const SELECT_EVALUATIONS: &str = "
SELECT id, app_id, dataset_id, evaluation_type, metrics, evaluated_at,
       created_at, updated_at
FROM evaluations ORDER BY created_at DESC";

pub const SELECT_EVALUATION_MEMBERS: &str = "
SELECT evaluation_id, query_record_id FROM evaluation_query_records
ORDER BY evaluation_id, position";

pub struct RawEvaluation {
  pub id:              String,
  pub app_id:          String,
  pub dataset_id:      String,
  pub evaluation_type: String,
  pub metrics:         String,
  pub evaluated_at:    String,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawEvaluation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      app_id:          row.get(1)?,
      dataset_id:      row.get(2)?,
      evaluation_type: row.get(3)?,
      metrics:         row.get(4)?,
      evaluated_at:    row.get(5)?,
      created_at:      row.get(6)?,
      updated_at:      row.get(7)?,
    })
  }

  pub fn into_evaluation(self, members: &mut Members) -> Result<Evaluation> {
    Ok(Evaluation {
      query_record_ids: members.remove(&self.id).unwrap_or_default(),
      evaluation_type:  decode_enum("evaluation type", &self.evaluation_type)?,
      metrics:          serde_json::from_str(&self.metrics)?,
      evaluated_at:     decode_dt(&self.evaluated_at)?,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
      id:               self.id,
      app_id:           self.app_id,
      dataset_id:       self.dataset_id,
    })
  }
}

/// Upsert an evaluation and replace its membership rows.
pub fn write_evaluation(evaluation: &Evaluation, out: &mut Vec<Statement>) -> Result<()> {
  out.push(Statement::new(
    "INSERT INTO evaluations (
       id, app_id, dataset_id, evaluation_type, metrics, evaluated_at,
       created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT(id) DO UPDATE SET
       app_id = excluded.app_id,
       dataset_id = excluded.dataset_id,
       evaluation_type = excluded.evaluation_type,
       metrics = excluded.metrics,
       evaluated_at = excluded.evaluated_at,
       created_at = excluded.created_at,
       updated_at = excluded.updated_at",
    vec![
      text(&evaluation.id),
      text(&evaluation.app_id),
      text(&evaluation.dataset_id),
      text(evaluation.evaluation_type.as_ref()),
      encode_json(Some(&evaluation.metrics))?,
      encode_dt(evaluation.evaluated_at),
      encode_dt(evaluation.created_at),
      encode_dt(evaluation.updated_at),
    ],
  ));
  out.push(Statement::new(
    "DELETE FROM evaluation_query_records WHERE evaluation_id = ?1",
    vec![text(&evaluation.id)],
  ));
  for (position, member) in evaluation.query_record_ids.iter().enumerate() {
    out.push(Statement::new(
      "INSERT OR IGNORE INTO evaluation_query_records (evaluation_id, query_record_id, position)
       VALUES (?1, ?2, ?3)",
      vec![text(&evaluation.id), text(member), SqlValue::Integer(position as i64)],
    ));
  }
  Ok(())
}

// ─── Optimization suggestions ────────────────────────────────────────────────

pub const SELECT_OPTIMIZATION_SUGGESTIONS: &str = "
SELECT id, app_id, source, source_id, priority, content, status, applied_at,
       result, created_at, updated_at
FROM optimization_suggestions ORDER BY created_at DESC";

pub struct RawOptimizationSuggestion {
  pub id:         String,
  pub app_id:     String,
  pub source:     String,
  pub source_id:  String,
  pub priority:   String,
  pub content:    String,
  pub status:     String,
  pub applied_at: Option<String>,
  pub result:     Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawOptimizationSuggestion {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      app_id:     row.get(1)?,
      source:     row.get(2)?,
      source_id:  row.get(3)?,
      priority:   row.get(4)?,
      content:    row.get(5)?,
      status:     row.get(6)?,
      applied_at: row.get(7)?,
      result:     row.get(8)?,
      created_at: row.get(9)?,
      updated_at: row.get(10)?,
    })
  }

  pub fn into_suggestion(self) -> Result<OptimizationSuggestion> {
    Ok(OptimizationSuggestion {
      id:         self.id,
      app_id:     self.app_id,
      source:     decode_enum("suggestion source", &self.source)?,
      source_id:  self.source_id,
      priority:   decode_enum("priority", &self.priority)?,
      content:    self.content,
      status:     decode_enum("suggestion status", &self.status)?,
      applied_at: decode_opt_dt(self.applied_at)?,
      result:     self.result,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub fn upsert_suggestion(suggestion: &OptimizationSuggestion) -> Statement {
  Statement::new(
    "INSERT INTO optimization_suggestions (
       id, app_id, source, source_id, priority, content, status, applied_at,
       result, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
     ON CONFLICT(id) DO UPDATE SET
       app_id = excluded.app_id,
       source = excluded.source,
       source_id = excluded.source_id,
       priority = excluded.priority,
       content = excluded.content,
       status = excluded.status,
       applied_at = excluded.applied_at,
       result = excluded.result,
       created_at = excluded.created_at,
       updated_at = excluded.updated_at",
    vec![
      text(&suggestion.id),
      text(&suggestion.app_id),
      text(suggestion.source.as_ref()),
      text(&suggestion.source_id),
      text(suggestion.priority.as_ref()),
      text(&suggestion.content),
      text(suggestion.status.as_ref()),
      encode_opt_dt(suggestion.applied_at),
      opt_text(suggestion.result.as_deref()),
      encode_dt(suggestion.created_at),
      encode_dt(suggestion.updated_at),
    ],
  )
}

// ─── Models ──────────────────────────────────────────────────────────────────

pub const SELECT_MODELS: &str = "
SELECT id, name, provider, base_url, api_key, model, metadata, created_at,
       updated_at
FROM models ORDER BY created_at DESC";

pub struct RawModel {
  pub id:         String,
  pub name:       String,
  pub provider:   String,
  pub base_url:   Option<String>,
  pub api_key:    Option<String>,
  pub model:      String,
  pub metadata:   Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawModel {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      name:       row.get(1)?,
      provider:   row.get(2)?,
      base_url:   row.get(3)?,
      api_key:    row.get(4)?,
      model:      row.get(5)?,
      metadata:   row.get(6)?,
      created_at: row.get(7)?,
      updated_at: row.get(8)?,
    })
  }

  pub fn into_model(self) -> Result<ModelConfig> {
    Ok(ModelConfig {
      id:         self.id,
      name:       self.name,
      provider:   self.provider,
      base_url:   self.base_url.unwrap_or_default(),
      api_key:    self.api_key.unwrap_or_default(),
      model:      self.model,
      metadata:   decode_json(self.metadata)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub fn upsert_model(model: &ModelConfig) -> Result<Statement> {
  Ok(Statement::new(
    "INSERT INTO models (
       id, name, provider, base_url, api_key, model, metadata, created_at,
       updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT(id) DO UPDATE SET
       name = excluded.name,
       provider = excluded.provider,
       base_url = excluded.base_url,
       api_key = excluded.api_key,
       model = excluded.model,
       metadata = excluded.metadata,
       created_at = excluded.created_at,
       updated_at = excluded.updated_at",
    vec![
      text(&model.id),
      text(&model.name),
      text(&model.provider),
      encode_non_empty(&model.base_url),
      encode_non_empty(&model.api_key),
      text(&model.model),
      encode_json(model.metadata.as_ref())?,
      encode_dt(model.created_at),
      encode_dt(model.updated_at),
    ],
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn optional_booleans_keep_null() {
    assert_eq!(encode_bool(None), SqlValue::Null);
    assert_eq!(encode_bool(Some(false)), SqlValue::Integer(0));
    assert_eq!(decode_bool(None), None);
    assert_eq!(decode_bool(Some(1)), Some(true));
  }

  #[test]
  fn prune_binds_ids_as_one_json_array() {
    let statement = prune(Collection::ModelConfig, ["m_1", "m_2"]).unwrap();
    assert!(statement.sql.starts_with("DELETE FROM models"));
    assert_eq!(statement.params, vec![SqlValue::Text(r#"["m_1","m_2"]"#.into())]);
  }

  #[test]
  fn bad_enum_text_is_a_decode_error() {
    let err = decode_enum::<cirl_core::model::Priority>("priority", "urgent").unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
  }
}
