use std::{path::Path, sync::Arc};

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use cirl_core::{
  document::Collection,
  model::{App, ModelConfig},
  record::QueryRecord,
  store::RecordStore,
};
use cirl_store_json::JsonStore;
use cirl_store_sqlite::SqliteStore;

use crate::{
  BackendKind, Error, StoreConfig, StoreSelector,
  migrate::{Outcome, backup_path, migrate},
};

fn app(id: &str) -> App {
  let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
  App {
    id:          id.into(),
    name:        format!("app {id}"),
    description: None,
    metadata:    None,
    created_at:  at,
    updated_at:  at,
  }
}

fn store_config(dir: &Path) -> StoreConfig {
  StoreConfig { data_dir: dir.to_path_buf(), ..Default::default() }
}

fn env(vars: &[(&str, &str)]) -> config::Environment {
  let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
  config::Environment::with_prefix("CIRL").source(Some(vars))
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[test]
fn defaults_apply_without_sources() {
  let config = StoreConfig::load_with(None, env(&[])).unwrap();
  assert_eq!(config, StoreConfig::default());
  assert_eq!(config.data_dir, Path::new("data"));
  assert_eq!(config.write_buffer_batch_size, 100);
  assert_eq!(config.write_buffer_flush_interval, 5000);
  assert_eq!(config.provider().unwrap(), None);
}

#[test]
fn environment_overrides_file() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("cirl.toml");
  std::fs::write(&file, "data_dir = \"/srv/cirl\"\ndata_provider = \"json\"\n").unwrap();

  let config = StoreConfig::load_with(
    Some(&file),
    env(&[("CIRL_DATA_PROVIDER", "sqlite"), ("CIRL_WRITE_BUFFER_BATCH_SIZE", "25")]),
  )
  .unwrap();

  assert_eq!(config.data_dir, Path::new("/srv/cirl"));
  assert_eq!(config.provider().unwrap(), Some(BackendKind::Sqlite));
  assert_eq!(config.buffer_options().batch_size, 25);
}

#[test]
fn missing_config_file_is_not_an_error() {
  let dir = tempfile::tempdir().unwrap();
  let config = StoreConfig::load_with(Some(&dir.path().join("absent.toml")), env(&[])).unwrap();
  assert_eq!(config, StoreConfig::default());
}

#[test]
fn unknown_provider_is_a_validation_error() {
  let config = StoreConfig { data_provider: Some("mongo".into()), ..Default::default() };
  let err = config.provider().unwrap_err();
  assert!(matches!(err, Error::Core(cirl_core::Error::Validation(_))));
  assert_eq!(BackendKind::parse("json").unwrap(), BackendKind::Json);
}

// ─── Selector ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn selector_defaults_to_sqlite() {
  let dir = tempfile::tempdir().unwrap();
  let selector = StoreSelector::new(store_config(dir.path()));

  let store = selector.get(None).await.unwrap();
  assert_eq!(store.kind(), BackendKind::Sqlite);
  assert!(dir.path().join("cirl.db").exists());
  selector.close().await.unwrap();
}

#[tokio::test]
async fn selector_uses_the_configured_provider() {
  let dir = tempfile::tempdir().unwrap();
  let selector = StoreSelector::new(StoreConfig {
    data_provider: Some("json".into()),
    ..store_config(dir.path())
  });

  assert_eq!(selector.get(None).await.unwrap().kind(), BackendKind::Json);
  assert_eq!(selector.active().await, Some(BackendKind::Json));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_calls_share_one_instance() {
  let dir = tempfile::tempdir().unwrap();
  let selector = Arc::new(StoreSelector::new(store_config(dir.path())));

  let mut handles = Vec::new();
  for _ in 0..8 {
    let selector = selector.clone();
    handles.push(tokio::spawn(async move { selector.get(None).await.unwrap() }));
  }
  let mut stores = Vec::new();
  for handle in handles {
    stores.push(handle.await.unwrap());
  }

  // Each SQLite instance has its own in-memory database, so a write is only
  // visible through every handle if they are all the same instance.
  stores[0].save_apps(&[app("app_1")]).await.unwrap();
  for store in &stores {
    assert_eq!(store.read_apps().await.unwrap().len(), 1);
  }
  selector.close().await.unwrap();
}

#[tokio::test]
async fn switching_backends_closes_the_previous_one() {
  let dir = tempfile::tempdir().unwrap();
  let selector = StoreSelector::new(store_config(dir.path()));

  let sqlite = selector.get(Some(BackendKind::Sqlite)).await.unwrap();
  sqlite.save_apps(&[app("app_1")]).await.unwrap();

  let json = selector.get(Some(BackendKind::Json)).await.unwrap();
  assert_eq!(json.kind(), BackendKind::Json);
  assert!(json.read_apps().await.unwrap().is_empty());

  // Closing took the final snapshot.
  let reopened = SqliteStore::open(dir.path().join("cirl.db")).await.unwrap();
  assert_eq!(reopened.read_apps().await.unwrap().len(), 1);
}

#[tokio::test]
async fn switching_survives_a_failed_close() {
  let dir = tempfile::tempdir().unwrap();
  let selector = StoreSelector::new(store_config(dir.path()));
  selector.get(Some(BackendKind::Sqlite)).await.unwrap();

  // A directory where the snapshot file goes makes the final snapshot fail.
  std::fs::create_dir(dir.path().join("cirl.db.tmp")).unwrap();

  let json = selector.get(Some(BackendKind::Json)).await.unwrap();
  assert_eq!(json.kind(), BackendKind::Json);
  assert_eq!(selector.active().await, Some(BackendKind::Json));
  assert_eq!(selector.get(None).await.unwrap().kind(), BackendKind::Json);
}

#[tokio::test]
async fn close_forgets_the_instance() {
  let dir = tempfile::tempdir().unwrap();
  let selector = StoreSelector::new(store_config(dir.path()));

  selector.get(Some(BackendKind::Json)).await.unwrap();
  selector.close().await.unwrap();
  assert_eq!(selector.active().await, None);
  selector.close().await.unwrap();
}

#[tokio::test]
async fn missing_data_dir_surfaces_from_either_backend() {
  let dir = tempfile::tempdir().unwrap();
  let selector = StoreSelector::new(store_config(&dir.path().join("nope")));

  let err = selector.get(Some(BackendKind::Json)).await.err().unwrap();
  assert!(matches!(err, Error::Json(cirl_store_json::Error::MissingDataDir(_))));
  let err = selector.get(Some(BackendKind::Sqlite)).await.err().unwrap();
  assert!(matches!(err, Error::Sqlite(cirl_store_sqlite::Error::MissingDataDir(_))));
}

// ─── Migration ───────────────────────────────────────────────────────────────

async fn json_fixture() -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  let json = JsonStore::open(dir.path()).await.unwrap();
  json.save_apps(&[app("app_1")]).await.unwrap();
  let mut record = QueryRecord::new("app_1", "q", "a", Utc::now());
  record.curated = Some(true);
  json.save_query_records(&[record]).await.unwrap();
  dir
}

#[tokio::test]
async fn migration_imports_and_backs_up() {
  let dir = json_fixture().await;
  let sqlite = SqliteStore::open(dir.path().join("cirl.db")).await.unwrap();

  let report = migrate(dir.path(), &sqlite).await.unwrap();

  assert_eq!(report.outcome(Collection::App), Some(Outcome::Imported(1)));
  assert_eq!(report.outcome(Collection::QueryRecord), Some(Outcome::Imported(1)));
  assert_eq!(report.outcome(Collection::Feedback), Some(Outcome::Missing));
  assert_eq!(report.imported(), 2);

  let apps_json = dir.path().join("apps.json");
  assert!(!apps_json.exists());
  assert!(backup_path(&apps_json).exists());
  assert_eq!(sqlite.read_query_records().await.unwrap()[0].curated, Some(true));

  let reopened = SqliteStore::open(dir.path().join("cirl.db")).await.unwrap();
  assert_eq!(reopened.read_apps().await.unwrap(), vec![app("app_1")]);
}

#[tokio::test]
async fn migrated_collections_are_skipped() {
  let dir = json_fixture().await;
  let sqlite = SqliteStore::open(dir.path().join("cirl.db")).await.unwrap();
  migrate(dir.path(), &sqlite).await.unwrap();

  // A fresh apps.json next to its backup is left alone.
  JsonStore::open(dir.path()).await.unwrap().save_apps(&[app("app_2")]).await.unwrap();
  let report = migrate(dir.path(), &sqlite).await.unwrap();

  assert_eq!(report.outcome(Collection::App), Some(Outcome::AlreadyMigrated));
  assert_eq!(report.imported(), 0);
  assert!(dir.path().join("apps.json").exists());
  assert_eq!(sqlite.read_apps().await.unwrap().len(), 1);
}

#[tokio::test]
async fn migration_keeps_existing_rows() {
  let dir = tempfile::tempdir().unwrap();
  let sqlite = SqliteStore::open(dir.path().join("cirl.db")).await.unwrap();
  let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
  let model = |id: &str| ModelConfig {
    id:         id.into(),
    name:       id.into(),
    provider:   "openai".into(),
    base_url:   String::new(),
    api_key:    String::new(),
    model:      "gpt-4o".into(),
    metadata:   None,
    created_at: at,
    updated_at: at,
  };
  sqlite.save_models(&[model("model_1")]).await.unwrap();
  JsonStore::open(dir.path()).await.unwrap().save_models(&[model("model_2")]).await.unwrap();

  migrate(dir.path(), &sqlite).await.unwrap();

  let mut ids: Vec<_> = sqlite.read_models().await.unwrap().into_iter().map(|m| m.id).collect();
  ids.sort();
  assert_eq!(ids, ["model_1", "model_2"]);
}

#[tokio::test]
async fn corrupt_json_aborts_before_renaming() {
  let dir = json_fixture().await;
  std::fs::write(dir.path().join("feedbacks.json"), "[{").unwrap();
  let sqlite = SqliteStore::open(dir.path().join("cirl.db")).await.unwrap();

  let err = migrate(dir.path(), &sqlite).await.unwrap_err();

  assert!(matches!(err, Error::Json(cirl_store_json::Error::Corrupt { .. })));
  assert!(dir.path().join("apps.json").exists());
  assert!(!backup_path(&dir.path().join("apps.json")).exists());
}
