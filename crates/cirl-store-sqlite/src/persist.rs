//! The live in-memory database and its deferred snapshots to disk.
//!
//! All queries run against an in-memory SQLite database. Writes mark it
//! dirty; the first dirty mark after a snapshot arms a single debounce timer,
//! and when that fires the whole database is backed up to `<file>.tmp` and
//! renamed over the data file. On-disk state therefore lags memory by at most
//! the debounce delay, until [`Database::close`] takes a final snapshot.

use std::{
  path::{Path, PathBuf},
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use rusqlite::{DatabaseName, backup::Progress, params, params_from_iter};

use crate::{
  Result,
  encode::Statement,
  schema::{MARKER_TABLE, MODELS_TABLE, SCHEMA},
};

/// Default delay between the first unsaved write and the snapshot.
pub const DEFAULT_SNAPSHOT_DELAY: Duration = Duration::from_secs(2);

/// Cheap-clone handle to the live database.
#[derive(Clone)]
pub(crate) struct Database {
  inner: Arc<Inner>,
}

struct Inner {
  conn:     tokio_rusqlite::Connection,
  /// Data file; `None` for a purely in-memory store that never snapshots.
  path:     Option<PathBuf>,
  delay:    Duration,
  timer:    Mutex<Timer>,
  /// Serializes backup-then-rename so two snapshots never share the
  /// temporary file.
  snapshot: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Timer {
  armed: Option<u64>,
  next:  u64,
}

impl Database {
  /// Load `path` into memory if it exists and make sure the schema is in
  /// place. A freshly created schema is snapshotted immediately.
  pub(crate) async fn open(path: Option<PathBuf>, delay: Duration) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;

    let source = match &path {
      Some(path) if tokio::fs::try_exists(path).await? => Some(path.clone()),
      _ => None,
    };
    let restored = source.is_some();

    let created = conn
      .call(move |conn| {
        if let Some(source) = source {
          conn.restore(DatabaseName::Main, source, None::<fn(Progress)>)?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let initialized: bool = conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
          params![MARKER_TABLE],
          |row| row.get(0),
        )?;
        if !initialized {
          conn.execute_batch(SCHEMA)?;
        }
        conn.execute_batch(MODELS_TABLE)?;
        Ok(!initialized)
      })
      .await?;

    let db = Self {
      inner: Arc::new(Inner {
        conn,
        path,
        delay,
        timer: Mutex::default(),
        snapshot: tokio::sync::Mutex::new(()),
      }),
    };

    if let Some(path) = db.path() {
      tracing::info!(path = %path.display(), restored, "opened sqlite database");
    }
    if created {
      tracing::info!("initialized sqlite schema");
      db.snapshot().await?;
    }
    Ok(db)
  }

  pub(crate) fn path(&self) -> Option<&Path> { self.inner.path.as_deref() }

  /// Run `f` on the database thread.
  pub(crate) async fn call<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, tokio_rusqlite::Error> + Send + 'static,
    R: Send + 'static,
  {
    Ok(self.inner.conn.call(f).await?)
  }

  /// Execute `statements` in one transaction, then mark the database dirty.
  pub(crate) async fn execute(&self, statements: Vec<Statement>) -> Result<()> {
    if statements.is_empty() {
      return Ok(());
    }

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        for statement in &statements {
          let mut prepared = tx.prepare_cached(&statement.sql)?;
          prepared.execute(params_from_iter(statement.params.iter()))?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self.mark_dirty();
    Ok(())
  }

  /// Arm the snapshot timer unless one is already pending.
  pub(crate) fn mark_dirty(&self) {
    if self.inner.path.is_none() {
      return;
    }

    let generation = {
      let mut timer = self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner);
      if timer.armed.is_some() {
        return;
      }
      let generation = timer.next;
      timer.next += 1;
      timer.armed = Some(generation);
      generation
    };

    let db = Arc::downgrade(&self.inner);
    let delay = self.inner.delay;
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let Some(inner) = db.upgrade() else {
        return;
      };
      let db = Database { inner };
      if !db.take_timer(generation) {
        return;
      }
      if let Err(err) = db.snapshot().await {
        tracing::error!(error = %err, "failed to snapshot sqlite database");
      }
    });
  }

  /// Disarm the timer if `generation` is still the armed one.
  fn take_timer(&self, generation: u64) -> bool {
    let mut timer = self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner);
    if timer.armed != Some(generation) {
      return false;
    }
    timer.armed = None;
    true
  }

  fn cancel_timer(&self) {
    self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner).armed = None;
  }

  /// Write the whole database to the data file now.
  pub(crate) async fn snapshot(&self) -> Result<()> {
    let Some(path) = self.inner.path.clone() else {
      return Ok(());
    };
    let _guard = self.inner.snapshot.lock().await;

    let tmp = tmp_path(&path);
    let target = tmp.clone();
    self
      .call(move |conn| {
        conn.backup(DatabaseName::Main, &target, None)?;
        Ok(())
      })
      .await?;
    tokio::fs::rename(&tmp, &path).await?;

    tracing::debug!(path = %path.display(), "wrote sqlite snapshot");
    Ok(())
  }

  /// Cancel the pending timer, take a final snapshot and close the
  /// connection.
  pub(crate) async fn close(&self) -> Result<()> {
    self.cancel_timer();
    self.snapshot().await?;
    self.inner.conn.clone().close().await?;
    Ok(())
  }
}

fn tmp_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(".tmp");
  PathBuf::from(name)
}
