//! Time-bucketed request statistics.
//!
//! For each of three fixed windows (24 hours, 7 days, 30 days) the engine
//! produces a rolling count and a zero-filled timeline histogram per app.
//! Hourly buckets are aligned to the top of the UTC hour, daily buckets to
//! UTC midnight; a timestamp exactly on a boundary belongs to the bucket that
//! starts there.
//!
//! [`compute_stats`] scans records in memory. Backends able to aggregate in
//! their query language build the same [`RequestStats`] from grouped counts
//! through [`ensure_entry`] and [`assign_timeline`].

use std::{
  collections::{BTreeMap, BTreeSet, HashMap, HashSet},
  sync::{Mutex, PoisonError},
  time::Duration,
};

use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{record::QueryRecord, timestamp};

/// How long a computed [`RequestStats`] is served from [`StatsCache`].
pub const STATS_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

// ─── Windows ─────────────────────────────────────────────────────────────────

/// A rolling time window. Also names the range of a hit-analysis run.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
  strum::Display,
)]
pub enum Window {
  #[serde(rename = "24h")]
  #[strum(serialize = "24h")]
  Day,
  #[serde(rename = "7d")]
  #[strum(serialize = "7d")]
  Week,
  #[serde(rename = "30d")]
  #[strum(serialize = "30d")]
  Month,
}

impl Window {
  pub const ALL: [Window; 3] = [Window::Day, Window::Week, Window::Month];

  pub fn duration(self) -> TimeDelta {
    match self {
      Self::Day => TimeDelta::hours(24),
      Self::Week => TimeDelta::days(7),
      Self::Month => TimeDelta::days(30),
    }
  }

  pub fn bucket_count(self) -> usize {
    match self {
      Self::Day => 24,
      Self::Week => 7,
      Self::Month => 30,
    }
  }

  /// Width of one bucket.
  pub fn interval(self) -> TimeDelta {
    match self {
      Self::Day => TimeDelta::hours(1),
      Self::Week | Self::Month => TimeDelta::days(1),
    }
  }

  /// Start of the bucket containing `at`.
  pub fn align(self, at: DateTime<Utc>) -> DateTime<Utc> {
    match self {
      Self::Day => align_to_hour(at),
      Self::Week | Self::Month => align_to_day(at),
    }
  }

  /// SQLite `strftime` pattern producing the same text as
  /// [`timestamp::format`] applied to [`Window::align`].
  pub fn strftime_bucket(self) -> &'static str {
    match self {
      Self::Day => "%Y-%m-%dT%H:00:00.000Z",
      Self::Week | Self::Month => "%Y-%m-%dT00:00:00.000Z",
    }
  }
}

pub fn align_to_day(at: DateTime<Utc>) -> DateTime<Utc> {
  at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn align_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
  align_to_day(at) + TimeDelta::hours(i64::from(at.hour()))
}

/// One window evaluated against a reference time.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineConfig {
  pub window:  Window,
  /// Records created at or after this instant are counted.
  pub since:   DateTime<Utc>,
  /// Bucket start times, ascending, ending at the bucket containing `now`.
  pub buckets: Vec<DateTime<Utc>>,
}

pub fn timeline_configs(now: DateTime<Utc>) -> Vec<TimelineConfig> {
  Window::ALL
    .into_iter()
    .map(|window| {
      let end = window.align(now);
      let buckets = (0..window.bucket_count())
        .rev()
        .map(|i| end - window.interval() * i as i32)
        .collect();
      TimelineConfig { window, since: now - window.duration(), buckets }
    })
    .collect()
}

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePoint {
  #[serde(with = "timestamp")]
  pub timestamp: DateTime<Utc>,
  pub value:     u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEntry {
  pub app_id:       String,
  pub count_24h:    u64,
  pub count_7d:     u64,
  pub count_30d:    u64,
  pub timeline_24h: Vec<TimelinePoint>,
  pub timeline_7d:  Vec<TimelinePoint>,
  pub timeline_30d: Vec<TimelinePoint>,
}

impl StatsEntry {
  pub fn new(app_id: impl Into<String>) -> Self {
    Self {
      app_id:       app_id.into(),
      count_24h:    0,
      count_7d:     0,
      count_30d:    0,
      timeline_24h: Vec::new(),
      timeline_7d:  Vec::new(),
      timeline_30d: Vec::new(),
    }
  }

  pub fn count(&self, window: Window) -> u64 {
    match window {
      Window::Day => self.count_24h,
      Window::Week => self.count_7d,
      Window::Month => self.count_30d,
    }
  }

  pub fn count_mut(&mut self, window: Window) -> &mut u64 {
    match window {
      Window::Day => &mut self.count_24h,
      Window::Week => &mut self.count_7d,
      Window::Month => &mut self.count_30d,
    }
  }

  pub fn timeline(&self, window: Window) -> &[TimelinePoint] {
    match window {
      Window::Day => &self.timeline_24h,
      Window::Week => &self.timeline_7d,
      Window::Month => &self.timeline_30d,
    }
  }

  pub fn timeline_mut(&mut self, window: Window) -> &mut Vec<TimelinePoint> {
    match window {
      Window::Day => &mut self.timeline_24h,
      Window::Week => &mut self.timeline_7d,
      Window::Month => &mut self.timeline_30d,
    }
  }
}

/// Stats keyed by app id.
pub type RequestStats = BTreeMap<String, StatsEntry>;

/// Per-app record counts keyed by bucket start.
pub type BucketCounts = HashMap<String, HashMap<DateTime<Utc>, u64>>;

pub fn ensure_entry<'a>(stats: &'a mut RequestStats, app_id: &str) -> &'a mut StatsEntry {
  stats
    .entry(app_id.to_owned())
    .or_insert_with(|| StatsEntry::new(app_id))
}

/// Write a complete, zero-filled timeline for `config.window`.
///
/// Targets the requested `app_ids`, or when empty every app already present
/// in `stats` or `counts`.
pub fn assign_timeline(
  stats: &mut RequestStats,
  app_ids: &[String],
  config: &TimelineConfig,
  counts: &BucketCounts,
) {
  let targets: BTreeSet<String> = if app_ids.is_empty() {
    stats.keys().chain(counts.keys()).cloned().collect()
  } else {
    app_ids.iter().cloned().collect()
  };

  for app_id in targets {
    let per_bucket = counts.get(&app_id);
    let timeline = config
      .buckets
      .iter()
      .map(|bucket| TimelinePoint {
        timestamp: *bucket,
        value:     per_bucket.and_then(|m| m.get(bucket)).copied().unwrap_or(0),
      })
      .collect();
    *ensure_entry(stats, &app_id).timeline_mut(config.window) = timeline;
  }
}

// ─── In-memory engine ────────────────────────────────────────────────────────

pub fn compute_stats(records: &[QueryRecord], app_ids: &[String]) -> RequestStats {
  compute_stats_at(records, app_ids, Utc::now())
}

/// [`compute_stats`] against an explicit reference time.
pub fn compute_stats_at(
  records: &[QueryRecord],
  app_ids: &[String],
  now: DateTime<Utc>,
) -> RequestStats {
  let configs = timeline_configs(now);
  let wanted: HashSet<&str> = app_ids.iter().map(String::as_str).collect();
  let records: Vec<&QueryRecord> = records
    .iter()
    .filter(|r| !r.is_ignored())
    .filter(|r| wanted.is_empty() || wanted.contains(r.app_id.as_str()))
    .collect();

  let mut stats = RequestStats::new();

  for record in &records {
    let entry = ensure_entry(&mut stats, &record.app_id);
    for config in &configs {
      if record.created_at >= config.since {
        *entry.count_mut(config.window) += 1;
      }
    }
  }

  for app_id in app_ids {
    ensure_entry(&mut stats, app_id);
  }

  for config in &configs {
    let mut counts = BucketCounts::new();
    for record in records.iter().filter(|r| r.created_at >= config.since) {
      *counts
        .entry(record.app_id.clone())
        .or_default()
        .entry(config.window.align(record.created_at))
        .or_default() += 1;
    }
    assign_timeline(&mut stats, app_ids, config, &counts);
  }

  stats
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Cache key for a set of app ids: sorted and comma-joined, `"all"` if empty.
pub fn cache_key(app_ids: &[String]) -> String {
  if app_ids.is_empty() {
    return "all".to_owned();
  }
  let mut sorted: Vec<&str> = app_ids.iter().map(String::as_str).collect();
  sorted.sort_unstable();
  sorted.join(",")
}

/// Expiry-only cache of computed stats. Writes never invalidate it; readers
/// accept up to one TTL of staleness in exchange for skipping a full scan.
#[derive(Debug)]
pub struct StatsCache {
  ttl:     Duration,
  entries: Mutex<HashMap<String, (Instant, RequestStats)>>,
}

impl Default for StatsCache {
  fn default() -> Self { Self::new(STATS_CACHE_TTL) }
}

impl StatsCache {
  pub fn new(ttl: Duration) -> Self { Self { ttl, entries: Mutex::default() } }

  pub fn get(&self, key: &str) -> Option<RequestStats> {
    let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    entries
      .get(key)
      .filter(|(expires_at, _)| *expires_at > Instant::now())
      .map(|(_, stats)| stats.clone())
  }

  pub fn insert(&self, key: String, stats: RequestStats) {
    let now = Instant::now();
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    entries.retain(|_, (expires_at, _)| *expires_at > now);
    entries.insert(key, (now + self.ttl, stats));
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
  }

  fn record(app_id: &str, created_at: DateTime<Utc>) -> QueryRecord {
    QueryRecord::new(app_id, "x", "y", created_at)
  }

  #[test]
  fn configs_have_expected_bucket_counts_and_alignment() {
    let now = at(14, 37);
    let configs = timeline_configs(now);

    assert_eq!(configs.len(), 3);
    assert_eq!(configs[0].buckets.len(), 24);
    assert_eq!(configs[1].buckets.len(), 7);
    assert_eq!(configs[2].buckets.len(), 30);

    assert_eq!(*configs[0].buckets.last().unwrap(), at(14, 0));
    assert_eq!(configs[0].buckets[0], at(14, 0) - TimeDelta::hours(23));
    assert_eq!(*configs[1].buckets.last().unwrap(), at(0, 0));
    assert_eq!(configs[2].buckets[0], at(0, 0) - TimeDelta::days(29));
    assert_eq!(configs[1].since, now - TimeDelta::days(7));
  }

  #[test]
  fn boundary_belongs_to_the_bucket_it_starts() {
    assert_eq!(Window::Day.align(at(9, 0)), at(9, 0));
    assert_eq!(Window::Day.align(at(8, 59)), at(8, 0));
    assert_eq!(Window::Week.align(at(0, 0)), at(0, 0));
  }

  #[test]
  fn zero_fill_for_requested_app_without_records() {
    let stats = compute_stats(&[], &["app_1".to_owned()]);

    assert_eq!(stats.len(), 1);
    let entry = &stats["app_1"];
    for window in Window::ALL {
      assert_eq!(entry.count(window), 0);
      assert_eq!(entry.timeline(window).len(), window.bucket_count());
      assert!(entry.timeline(window).iter().all(|p| p.value == 0));
    }
  }

  #[test]
  fn single_fresh_record_counts_in_every_window() {
    let now = Utc::now();
    let stats = compute_stats_at(&[record("app_1", now)], &[], now);

    let entry = &stats["app_1"];
    assert_eq!((entry.count_24h, entry.count_7d, entry.count_30d), (1, 1, 1));
    for window in Window::ALL {
      assert_eq!(entry.timeline(window).last().unwrap().value, 1);
    }
  }

  #[test]
  fn ignored_and_unrequested_records_are_excluded() {
    let now = at(12, 0);
    let mut ignored = record("app_1", now);
    ignored.ignored = Some(true);
    let records = vec![ignored, record("app_1", now), record("app_2", now)];

    let stats = compute_stats_at(&records, &["app_1".to_owned()], now);

    assert_eq!(stats.len(), 1);
    assert_eq!(stats["app_1"].count_24h, 1);
  }

  #[test]
  fn counts_respect_each_window() {
    let now = at(12, 0);
    let records = vec![
      record("app_1", now - TimeDelta::hours(2)),
      record("app_1", now - TimeDelta::days(3)),
      record("app_1", now - TimeDelta::days(20)),
      record("app_1", now - TimeDelta::days(45)),
    ];

    let stats = compute_stats_at(&records, &[], now);
    let entry = &stats["app_1"];

    assert_eq!((entry.count_24h, entry.count_7d, entry.count_30d), (1, 2, 3));
    let week: u64 = entry.timeline_7d.iter().map(|p| p.value).sum();
    assert_eq!(week, 2);
    assert_eq!(entry.timeline_24h[21].value, 1);
  }

  #[test]
  fn serializes_with_camel_case_keys() {
    let value = serde_json::to_value(StatsEntry::new("app_1")).unwrap();
    assert!(value.get("count24h").is_some());
    assert!(value.get("timeline30d").is_some());
    assert_eq!(value["appId"], "app_1");
  }

  #[test]
  fn cache_key_is_order_independent() {
    let a = cache_key(&["b".to_owned(), "a".to_owned()]);
    let b = cache_key(&["a".to_owned(), "b".to_owned()]);
    assert_eq!(a, "a,b");
    assert_eq!(a, b);
    assert_eq!(cache_key(&[]), "all");
  }

  #[tokio::test(start_paused = true)]
  async fn cache_entries_expire_after_ttl() {
    let cache = StatsCache::default();
    cache.insert("all".into(), compute_stats(&[], &["app_1".to_owned()]));

    assert!(cache.get("all").is_some());
    assert!(cache.get("app_1").is_none());

    tokio::time::advance(STATS_CACHE_TTL + Duration::from_secs(1)).await;
    assert!(cache.get("all").is_none());
  }
}
