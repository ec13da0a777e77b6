//! Per-file reader/writer locks.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::RwLock;

/// One lock per collection file, created on first use.
///
/// [`tokio::sync::RwLock`] queues waiters in FIFO order: once a writer is
/// waiting, later readers queue behind it, so a stream of readers can never
/// starve a save.
#[derive(Debug, Default)]
pub(crate) struct FileLocks {
  locks: Mutex<HashMap<&'static str, Arc<RwLock<()>>>>,
}

impl FileLocks {
  pub(crate) fn get(&self, file: &'static str) -> Arc<RwLock<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(file).or_default())
  }
}
