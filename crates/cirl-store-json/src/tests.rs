use chrono::{SubsecRound, TimeDelta, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use cirl_core::{
  document::Collection,
  model::App,
  record::QueryRecord,
  store::RecordStore,
};

use crate::{Error, JsonStore, file_name};

async fn store() -> (TempDir, JsonStore) {
  let dir = tempfile::tempdir().expect("temp dir");
  let store = JsonStore::open(dir.path()).await.expect("json store");
  (dir, store)
}

fn app(id: &str, minutes: i64) -> App {
  let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + TimeDelta::minutes(minutes);
  App {
    id:          id.into(),
    name:        format!("app {id}"),
    description: None,
    metadata:    None,
    created_at:  at,
    updated_at:  at,
  }
}

// ─── Opening and reading ─────────────────────────────────────────────────────

#[tokio::test]
async fn missing_data_dir_is_fatal() {
  let dir = tempfile::tempdir().unwrap();
  let err = JsonStore::open(dir.path().join("nope")).await.err().unwrap();
  assert!(matches!(err, Error::MissingDataDir(_)));
}

#[tokio::test]
async fn missing_and_blank_files_read_empty() {
  let (dir, store) = store().await;
  assert!(store.read_apps().await.unwrap().is_empty());

  std::fs::write(dir.path().join("apps.json"), "  \n").unwrap();
  assert!(store.read_apps().await.unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_file_is_an_error() {
  let (dir, store) = store().await;
  std::fs::write(dir.path().join("feedbacks.json"), "[{").unwrap();

  let err = store.read_feedbacks().await.unwrap_err();
  assert!(matches!(err, Error::Corrupt { .. }));
}

// ─── Saving ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn round_trip_is_lossless_and_newest_first() {
  let (_dir, store) = store().await;
  let mut described = app("app_2", 10);
  described.description = Some("faq bot".into());
  described.metadata = json!({ "owner": "support" }).as_object().cloned();

  store.save_apps(&[app("app_1", 0), described.clone(), app("app_3", 5)]).await.unwrap();
  let apps = store.read_apps().await.unwrap();

  let ids: Vec<_> = apps.iter().map(|a| a.id.as_str()).collect();
  assert_eq!(ids, ["app_2", "app_3", "app_1"]);
  assert_eq!(apps[0], described);
}

#[tokio::test]
async fn files_are_pretty_printed_arrays() {
  let (dir, store) = store().await;
  store.save_apps(&[app("app_1", 0)]).await.unwrap();

  let text = std::fs::read_to_string(dir.path().join(file_name(Collection::App))).unwrap();
  assert!(text.starts_with("[\n  {\n    \"id\": \"app_1\""));
}

#[tokio::test]
async fn save_is_idempotent() {
  let (_dir, store) = store().await;
  let apps = [app("app_1", 0), app("app_2", 1)];

  store.save_apps(&apps).await.unwrap();
  let first = store.read_apps().await.unwrap();
  store.save_apps(&first).await.unwrap();

  assert_eq!(store.read_apps().await.unwrap(), first);
}

#[tokio::test]
async fn resaving_what_was_read_keeps_the_file_bytes() {
  let (dir, store) = store().await;
  let path = dir.path().join(file_name(Collection::App));

  store.save_apps(&[app("app_old", 0), app("app_new", 10)]).await.unwrap();
  let before = std::fs::read(&path).unwrap();
  store.save_apps(&store.read_apps().await.unwrap()).await.unwrap();
  let after = std::fs::read(&path).unwrap();

  assert_eq!(before, after);
  let text = String::from_utf8(after).unwrap();
  assert!(text.find("app_new").unwrap() < text.find("app_old").unwrap());
}

#[tokio::test]
async fn optional_record_flags_round_trip() {
  let (_dir, store) = store().await;
  let now = Utc::now().trunc_subsecs(3);
  let mut flagged = QueryRecord::new("app_1", "q", "a", now);
  flagged.curated = Some(false);
  flagged.tags = Some(Vec::new());
  let plain = QueryRecord::new("app_1", "q2", "a2", now - TimeDelta::seconds(1));

  store.save_query_records(&[flagged.clone(), plain.clone()]).await.unwrap();
  let records = store.read_query_records().await.unwrap();

  assert_eq!(records, vec![flagged, plain]);
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_exactly_one() {
  let (_dir, store) = store().await;
  store.save_apps(&[app("app_1", 0), app("app_2", 1)]).await.unwrap();

  assert!(store.delete(Collection::App, "app_1").await.unwrap());
  assert!(!store.delete(Collection::App, "app_1").await.unwrap());
  assert!(!store.delete(Collection::Dataset, "ds_1").await.unwrap());

  let apps = store.read_apps().await.unwrap();
  assert_eq!(apps.len(), 1);
  assert_eq!(apps[0].id, "app_2");
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_never_interleave() {
  let (_dir, store) = store().await;

  let mut handles = Vec::new();
  for n in 0..16 {
    let store = store.clone();
    handles.push(tokio::spawn(async move {
      let apps: Vec<App> = (0..n + 1).map(|i| app(&format!("app_{n}_{i}"), i)).collect();
      store.save_apps(&apps).await.unwrap();
      store.read_apps().await.unwrap().len()
    }));
  }
  for handle in handles {
    assert!(handle.await.unwrap() >= 1);
  }

  let apps = store.read_apps().await.unwrap();
  let writer = apps[0].id.split('_').nth(1).unwrap().to_owned();
  assert!(apps.iter().all(|a| a.id.split('_').nth(1) == Some(writer.as_str())));
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_count_fresh_records_and_cache() {
  let (_dir, store) = store().await;
  let record = QueryRecord::new("app_1", "q", "a", Utc::now());
  store.save_query_records(&[record]).await.unwrap();

  let stats = store.request_stats(&[]).await.unwrap();
  let entry = &stats["app_1"];
  assert_eq!((entry.count_24h, entry.count_7d, entry.count_30d), (1, 1, 1));
  assert_eq!(entry.timeline_24h.len(), 24);

  // Served from cache: a later write is not visible until the TTL expires.
  store.save_query_records(&[]).await.unwrap();
  assert_eq!(store.request_stats(&[]).await.unwrap(), stats);
}

#[tokio::test]
async fn stats_zero_fill_requested_apps() {
  let (_dir, store) = store().await;
  let stats = store.request_stats(&["app_9".to_owned()]).await.unwrap();

  let entry = &stats["app_9"];
  assert_eq!(entry.count_30d, 0);
  assert_eq!(entry.timeline_7d.len(), 7);
  assert_eq!(entry.timeline_30d.len(), 30);
}
