//! Historical execution-time estimates.
//!
//! The Fixed-Size strategy can bound a batch by estimated duration. It asks an
//! [`Analytics`] provider how long a test is expected to take at a given
//! percentile of its recorded history.
//!
//! Providers must answer quickly and never fail: a test without history, or
//! a provider that cannot reach its backing store, answers `None`, and the
//! strategy counts that test as free.
//!
//! # History file
//!
//! [`DurationHistory`] keeps samples in memory and can be persisted as JSON,
//! keyed by test id:
//!
//! ```json
//! {
//!   "com.example.LoginTest#validPassword": [
//!     { "duration_millis": 1840, "recorded_at": "2024-05-01T10:00:00Z" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Test;

/// Answers duration estimates for tests.
///
/// Implementations are shared between device workers and must be
/// `Send + Sync`. Lookups happen while the pending queue is locked, so they
/// must not block.
pub trait Analytics: Send + Sync {
    /// Returns the estimated duration of `test` at `percentile` (0-100].
    ///
    /// When `since` is set, only history recorded at or after that instant
    /// is considered. Returns `None` when there is no usable history.
    fn estimated_duration(
        &self,
        test: &Test,
        percentile: f64,
        since: Option<DateTime<Utc>>,
    ) -> Option<Duration>;
}

/// An analytics provider with no history. Every estimate is `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl Analytics for NoHistory {
    fn estimated_duration(
        &self,
        _test: &Test,
        _percentile: f64,
        _since: Option<DateTime<Utc>>,
    ) -> Option<Duration> {
        None
    }
}

/// One recorded execution of a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSample {
    /// Wall-clock execution time in milliseconds.
    pub duration_millis: u64,

    /// When the execution finished.
    pub recorded_at: DateTime<Utc>,
}

/// In-memory execution history keyed by test id.
///
/// Estimates use the nearest-rank percentile over the samples that fall in
/// the requested window.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use pacer::analytics::{Analytics, DurationHistory};
/// use pacer::model::Test;
///
/// let test = Test::new("com.example", "LoginTest", "validPassword");
/// let mut history = DurationHistory::default();
/// for millis in [100, 200, 300, 400] {
///     history.record(&test, Duration::from_millis(millis), chrono::Utc::now());
/// }
///
/// assert_eq!(
///     history.estimated_duration(&test, 50.0, None),
///     Some(Duration::from_millis(200))
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct DurationHistory {
    samples: HashMap<String, Vec<DurationSample>>,
}

impl DurationHistory {
    /// Loads history from a JSON file.
    ///
    /// A missing or unreadable file yields an empty history: batching then
    /// proceeds as if no test had ever run.
    pub fn load(path: &Path) -> Self {
        tracing::debug!("Loading duration history from: {}", path.display());

        if !path.exists() {
            tracing::debug!("History file does not exist, using empty history");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                match serde_json::from_str::<HashMap<String, Vec<DurationSample>>>(&contents) {
                    Ok(samples) => {
                        tracing::debug!("Loaded history for {} tests", samples.len());
                        Self { samples }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse history file, using empty history: {}", e);
                        Self::default()
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read history file, using empty history: {}", e);
                Self::default()
            }
        }
    }

    /// Writes the history to a JSON file, creating parent directories.
    ///
    /// The executor that runs batches on real devices records finished tests
    /// with [`record`](Self::record) and saves the file after the run, so the
    /// next run's budgets see them.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let contents =
            serde_json::to_string_pretty(&self.samples).context("Failed to serialize history")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write history file: {}", path.display()))?;

        tracing::debug!("Saved history for {} tests", self.samples.len());
        Ok(())
    }

    /// Records one execution of `test`.
    pub fn record(&mut self, test: &Test, duration: Duration, recorded_at: DateTime<Utc>) {
        let duration_millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.samples.entry(test.id()).or_default().push(DurationSample {
            duration_millis,
            recorded_at,
        });
    }

    /// Returns the number of tests with at least one sample.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples were recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Analytics for DurationHistory {
    fn estimated_duration(
        &self,
        test: &Test,
        percentile: f64,
        since: Option<DateTime<Utc>>,
    ) -> Option<Duration> {
        let mut millis: Vec<u64> = self
            .samples
            .get(&test.id())?
            .iter()
            .filter(|s| since.is_none_or(|cutoff| s.recorded_at >= cutoff))
            .map(|s| s.duration_millis)
            .collect();

        nearest_rank(&mut millis, percentile).map(Duration::from_millis)
    }
}

/// Nearest-rank percentile. Sorts `values` in place.
fn nearest_rank(values: &mut [u64], percentile: f64) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();

    let n = values.len();
    let rank = ((percentile.clamp(0.0, 100.0) / 100.0) * n as f64).ceil() as usize;
    Some(values[rank.clamp(1, n) - 1])
}
