//! [`StoreSelector`]: owner of the process-wide store instance.

use cirl_core::store::RecordStore;
use tokio::sync::Mutex;

use crate::{BackendKind, Result, Store, StoreConfig};

/// Lazily opens and caches one [`Store`].
///
/// The first [`get`](Self::get) opens the backend; later calls return the
/// same instance until a different backend is requested, at which point the
/// previous one is closed before the new one opens. Concurrent first calls
/// wait on the same lock, so exactly one instance is ever constructed.
pub struct StoreSelector {
  config:  StoreConfig,
  current: Mutex<Option<Store>>,
}

impl StoreSelector {
  pub fn new(config: StoreConfig) -> Self { Self { config, current: Mutex::new(None) } }

  pub fn config(&self) -> &StoreConfig { &self.config }

  /// Return the active store, opening or switching backends as needed.
  ///
  /// With `kind` unset the cached instance is returned as is; with nothing
  /// cached the configured provider is opened, falling back to SQLite.
  pub async fn get(&self, kind: Option<BackendKind>) -> Result<Store> {
    let mut current = self.current.lock().await;

    if let Some(store) = current.as_ref()
      && kind.is_none_or(|kind| kind == store.kind())
    {
      return Ok(store.clone());
    }

    let kind = match kind {
      Some(kind) => kind,
      None => self.config.provider()?.unwrap_or(BackendKind::Sqlite),
    };

    if let Some(previous) = current.take() {
      tracing::info!(from = %previous.kind(), to = %kind, "switching data provider");
      if let Err(err) = previous.close().await {
        tracing::error!(error = %err, provider = %previous.kind(), "failed to close previous data provider");
      }
    }

    let store = Store::open(kind, &self.config).await?;
    tracing::info!(
      provider = %kind,
      data_dir = %self.config.data_dir.display(),
      "opened data provider"
    );
    *current = Some(store.clone());
    Ok(store)
  }

  /// Backend of the cached instance, if one is open.
  pub async fn active(&self) -> Option<BackendKind> {
    self.current.lock().await.as_ref().map(Store::kind)
  }

  /// Close the cached instance, if any, and forget it.
  pub async fn close(&self) -> Result<()> {
    let Some(store) = self.current.lock().await.take() else {
      return Ok(());
    };
    store.close().await
  }
}
