//! A write-coalescing buffer.
//!
//! Items accumulate in memory and reach the underlying [`BatchWriter`] in
//! batches: immediately once `batch_size` items are pending, or after
//! `flush_interval` otherwise. A batch that fails to write goes back to the
//! head of the buffer in its original order, so nothing is dropped and
//! insertion order survives retries.
//!
//! At most one flush runs at a time. A flush requested while another is in
//! flight is a no-op; the items it would have written stay pending.

use std::{
  future::Future,
  mem,
  sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
  time::Duration,
};

use tokio::sync::Notify;

/// Default number of pending items that triggers an immediate flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default delay before pending items are flushed.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

/// The sink a [`WriteBuffer`] drains into.
pub trait BatchWriter<T>: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist `batch` as a unit.
  fn write_batch<'a>(
    &'a self,
    batch: &'a [T],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
  pub batch_size:     usize,
  pub flush_interval: Duration,
}

impl Default for BufferOptions {
  fn default() -> Self {
    Self { batch_size: DEFAULT_BATCH_SIZE, flush_interval: DEFAULT_FLUSH_INTERVAL }
  }
}

/// Receives flush failures together with the batch that was re-queued.
pub type ErrorHandler<T, E> = Box<dyn Fn(&E, &[T]) + Send + Sync>;

/// How a single flush attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
  /// The pending batch was written, handed to the error handler, or empty.
  Done,
  /// Another flush was in flight; nothing was taken.
  Busy,
}

// ─── Buffer ──────────────────────────────────────────────────────────────────

pub struct WriteBuffer<T, W: BatchWriter<T>> {
  inner: Arc<Inner<T, W>>,
}

impl<T, W: BatchWriter<T>> Clone for WriteBuffer<T, W> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

struct Inner<T, W: BatchWriter<T>> {
  writer:   W,
  options:  BufferOptions,
  on_error: Option<ErrorHandler<T, W::Error>>,
  state:    Mutex<State<T>>,
  idle:     Notify,
}

struct State<T> {
  items:      Vec<T>,
  flushing:   bool,
  /// Generation of the armed flush timer, if any.
  timer:      Option<u64>,
  next_timer: u64,
}

impl<T, W> WriteBuffer<T, W>
where
  T: Clone + Send + Sync + 'static,
  W: BatchWriter<T>,
{
  /// Failed flushes are returned to the caller that triggered them.
  pub fn new(writer: W, options: BufferOptions) -> Self {
    Self::build(writer, options, None)
  }

  /// Failed flushes are handed to `on_error` and the flush reports success.
  pub fn with_error_handler(
    writer: W,
    options: BufferOptions,
    on_error: impl Fn(&W::Error, &[T]) + Send + Sync + 'static,
  ) -> Self {
    Self::build(writer, options, Some(Box::new(on_error)))
  }

  fn build(
    writer: W,
    options: BufferOptions,
    on_error: Option<ErrorHandler<T, W::Error>>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        writer,
        options: BufferOptions { batch_size: options.batch_size.max(1), ..options },
        on_error,
        state: Mutex::new(State {
          items:      Vec::new(),
          flushing:   false,
          timer:      None,
          next_timer: 0,
        }),
        idle: Notify::new(),
      }),
    }
  }

  pub fn options(&self) -> BufferOptions { self.inner.options }

  pub fn writer(&self) -> &W { &self.inner.writer }

  /// Append `item`, flushing immediately once `batch_size` items are pending.
  pub async fn add(&self, item: T) -> Result<(), W::Error> {
    let full = {
      let mut state = self.inner.lock();
      state.items.push(item);
      if state.timer.is_none() {
        self.arm_timer(&mut state);
      }
      state.items.len() >= self.inner.options.batch_size
    };

    if full { self.flush().await } else { Ok(()) }
  }

  /// Write everything pending as one batch.
  pub async fn flush(&self) -> Result<(), W::Error> {
    self.inner.flush().await.map(|_| ())
  }

  /// Wait for an in-flight flush to settle, then flush what is left. After
  /// this returns `Ok`, every item added before the call has been written.
  pub async fn sync(&self) -> Result<(), W::Error> { self.inner.settle().await }

  /// Cancel the flush timer and write out everything pending.
  pub async fn close(&self) -> Result<(), W::Error> {
    self.inner.lock().timer = None;
    self.sync().await
  }

  pub fn len(&self) -> usize { self.inner.lock().items.len() }

  pub fn is_empty(&self) -> bool { self.inner.lock().items.is_empty() }

  /// Drop pending items without writing them.
  pub fn clear(&self) {
    let mut state = self.inner.lock();
    state.items.clear();
    state.timer = None;
  }

  fn arm_timer(&self, state: &mut State<T>) {
    let generation = state.next_timer;
    state.next_timer += 1;
    state.timer = Some(generation);

    let inner: Weak<Inner<T, W>> = Arc::downgrade(&self.inner);
    let interval = self.inner.options.flush_interval;
    tokio::spawn(async move {
      tokio::time::sleep(interval).await;
      let Some(inner) = inner.upgrade() else {
        return;
      };
      let current = inner.lock().timer;
      if current != Some(generation) {
        return;
      }
      if let Err(err) = inner.settle().await {
        tracing::error!(error = %err, "timed write buffer flush failed");
      }
    });
  }
}

impl<T, W> Inner<T, W>
where
  T: Clone + Send + Sync + 'static,
  W: BatchWriter<T>,
{
  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  async fn flush(&self) -> Result<Attempt, W::Error> {
    let batch = {
      let mut state = self.lock();
      if state.flushing {
        return Ok(Attempt::Busy);
      }
      if state.items.is_empty() {
        return Ok(Attempt::Done);
      }
      state.flushing = true;
      state.timer = None;
      mem::take(&mut state.items)
    };

    let mut in_flight = InFlight { inner: self, batch: Some(batch) };
    let written = match in_flight.batch.as_deref() {
      Some(batch) => self.writer.write_batch(batch).await,
      None => Ok(()),
    };

    match written {
      Ok(()) => {
        in_flight.batch = None;
        Ok(Attempt::Done)
      }
      Err(err) => {
        let failed = in_flight.batch.clone().unwrap_or_default();
        drop(in_flight);
        tracing::warn!(error = %err, items = failed.len(), "write buffer flush failed, batch re-queued");
        match &self.on_error {
          Some(handler) => {
            handler(&err, &failed);
            Ok(Attempt::Done)
          }
          None => Err(err),
        }
      }
    }
  }

  /// Flush until an attempt is not turned away by another flush in flight.
  /// Another flush can start between `wait_idle` and `flush`, so one round
  /// is not enough.
  async fn settle(&self) -> Result<(), W::Error> {
    loop {
      self.wait_idle().await;
      if self.flush().await? == Attempt::Done {
        return Ok(());
      }
    }
  }

  async fn wait_idle(&self) {
    loop {
      let notified = self.idle.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();
      let flushing = self.lock().flushing;
      if !flushing {
        return;
      }
      notified.await;
    }
  }
}

/// Marks a flush in progress. Dropping it with the batch still held puts
/// the batch back at the head of the buffer, which also covers a flush
/// future that is cancelled mid-write.
struct InFlight<'a, T, W: BatchWriter<T>> {
  inner: &'a Inner<T, W>,
  batch: Option<Vec<T>>,
}

impl<T, W: BatchWriter<T>> Drop for InFlight<'_, T, W> {
  fn drop(&mut self) {
    let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(mut batch) = self.batch.take() {
      batch.append(&mut state.items);
      state.items = batch;
    }
    state.flushing = false;
    drop(state);
    self.inner.idle.notify_waiters();
  }
}

#[cfg(test)]
mod tests {
  use std::{
    io,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
  };

  use super::*;

  #[derive(Clone, Default)]
  struct Recorder {
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
    fail:    Arc<AtomicBool>,
  }

  impl Recorder {
    fn batches(&self) -> Vec<Vec<u32>> { self.batches.lock().unwrap().clone() }

    fn set_failing(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }
  }

  impl BatchWriter<u32> for Recorder {
    type Error = io::Error;

    async fn write_batch(&self, batch: &[u32]) -> Result<(), io::Error> {
      if self.fail.load(Ordering::SeqCst) {
        return Err(io::Error::other("disk full"));
      }
      self.batches.lock().unwrap().push(batch.to_vec());
      Ok(())
    }
  }

  /// Parks every write until the test releases it.
  #[derive(Clone, Default)]
  struct Gated {
    recorder: Recorder,
    calls:    Arc<AtomicUsize>,
    entered:  Arc<Notify>,
    release:  Arc<Notify>,
  }

  impl BatchWriter<u32> for Gated {
    type Error = io::Error;

    async fn write_batch(&self, batch: &[u32]) -> Result<(), io::Error> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.entered.notify_one();
      self.release.notified().await;
      self.recorder.write_batch(batch).await
    }
  }

  /// Yields mid-write so other tasks get a chance to flush concurrently.
  #[derive(Clone, Default)]
  struct Yielding(Recorder);

  impl BatchWriter<u32> for Yielding {
    type Error = io::Error;

    async fn write_batch(&self, batch: &[u32]) -> Result<(), io::Error> {
      tokio::task::yield_now().await;
      self.0.write_batch(batch).await
    }
  }

  fn options(batch_size: usize) -> BufferOptions {
    BufferOptions { batch_size, flush_interval: Duration::from_secs(5) }
  }

  #[tokio::test(start_paused = true)]
  async fn flushes_immediately_at_batch_size() {
    let recorder = Recorder::default();
    let buffer = WriteBuffer::new(recorder.clone(), options(3));

    for i in 1..=3 {
      buffer.add(i).await.unwrap();
    }

    assert_eq!(recorder.batches(), vec![vec![1, 2, 3]]);
    assert!(buffer.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn timer_flushes_a_partial_batch() {
    let recorder = Recorder::default();
    let buffer = WriteBuffer::new(recorder.clone(), options(10));

    buffer.add(1).await.unwrap();
    buffer.add(2).await.unwrap();
    assert!(recorder.batches().is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(recorder.batches(), vec![vec![1, 2]]);
    assert_eq!(buffer.len(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn failed_batch_is_requeued_at_head_in_order() {
    let recorder = Recorder::default();
    let buffer = WriteBuffer::new(recorder.clone(), options(10));

    buffer.add(1).await.unwrap();
    buffer.add(2).await.unwrap();
    recorder.set_failing(true);
    assert!(buffer.flush().await.is_err());
    assert_eq!(buffer.len(), 2);

    buffer.add(3).await.unwrap();
    recorder.set_failing(false);
    buffer.flush().await.unwrap();

    assert_eq!(recorder.batches(), vec![vec![1, 2, 3]]);
  }

  #[tokio::test(start_paused = true)]
  async fn error_handler_receives_failure_and_flush_succeeds() {
    let recorder = Recorder::default();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let buffer = WriteBuffer::with_error_handler(recorder.clone(), options(10), move |_, batch| {
      counter.fetch_add(batch.len(), Ordering::SeqCst);
    });

    buffer.add(7).await.unwrap();
    buffer.add(8).await.unwrap();
    recorder.set_failing(true);

    buffer.flush().await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(buffer.len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn close_writes_pending_items_once() {
    let recorder = Recorder::default();
    let buffer = WriteBuffer::new(recorder.clone(), options(10));

    buffer.add(1).await.unwrap();
    buffer.close().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(recorder.batches(), vec![vec![1]]);
  }

  #[tokio::test(start_paused = true)]
  async fn clear_discards_without_writing() {
    let recorder = Recorder::default();
    let buffer = WriteBuffer::new(recorder.clone(), options(10));

    buffer.add(1).await.unwrap();
    buffer.clear();
    buffer.flush().await.unwrap();

    assert!(buffer.is_empty());
    assert!(recorder.batches().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn empty_flush_is_a_no_op() {
    let recorder = Recorder::default();
    let buffer = WriteBuffer::new(recorder.clone(), BufferOptions::default());

    buffer.flush().await.unwrap();

    assert!(recorder.batches().is_empty());
  }

  #[tokio::test]
  async fn flush_during_a_flush_is_a_no_op_and_sync_waits() {
    let writer = Gated::default();
    let buffer = WriteBuffer::new(writer.clone(), BufferOptions {
      batch_size:     10,
      flush_interval: Duration::from_secs(3600),
    });

    buffer.add(1).await.unwrap();
    buffer.add(2).await.unwrap();
    let first = tokio::spawn({
      let buffer = buffer.clone();
      async move { buffer.flush().await }
    });
    writer.entered.notified().await;

    buffer.flush().await.unwrap();
    assert_eq!(writer.calls.load(Ordering::SeqCst), 1);

    buffer.add(3).await.unwrap();
    buffer.add(4).await.unwrap();
    buffer.flush().await.unwrap();
    assert_eq!(buffer.len(), 2);
    assert_eq!(writer.calls.load(Ordering::SeqCst), 1);

    let sync = tokio::spawn({
      let buffer = buffer.clone();
      async move { buffer.sync().await }
    });
    for _ in 0..10 {
      tokio::task::yield_now().await;
    }
    assert!(!sync.is_finished());
    assert!(writer.recorder.batches().is_empty());

    writer.release.notify_one();
    first.await.unwrap().unwrap();
    writer.release.notify_one();
    sync.await.unwrap().unwrap();

    assert_eq!(writer.recorder.batches(), vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    assert!(buffer.is_empty());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn sync_sees_every_earlier_item_despite_timer_flushes() {
    let writer = Yielding::default();
    let buffer = WriteBuffer::new(writer.clone(), BufferOptions {
      batch_size:     1000,
      flush_interval: Duration::from_millis(1),
    });

    for i in 0..200 {
      buffer.add(i).await.unwrap();
      if i % 3 == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
      }
      buffer.sync().await.unwrap();

      let written: Vec<u32> = writer.0.batches().into_iter().flatten().collect();
      assert_eq!(written, (0..=i).collect::<Vec<_>>());
    }
  }
}
