//! Fixed-size batching with an optional duration budget.
//!
//! Takes tests from the front of the queue until the batch holds `size`
//! tests. With a [`DurationBudget`], it also stops before the test that would
//! push the batch's estimated duration over the limit. The first test is
//! always taken, so a single slow test still gets its own batch.
//!
//! # Last mile
//!
//! Near the end of a run the queue may be left with a handful of tests that
//! would otherwise go out as a tiny final batch. When fewer than
//! `last_mile_length` tests would remain, the current batch absorbs them all.
//! This can make the final batch larger than `size` or over budget.
//!
//! # Example
//!
//! ```
//! use std::collections::VecDeque;
//! use pacer::analytics::NoHistory;
//! use pacer::model::Test;
//! use pacer::strategy::{BatchingStrategy, FixedSizeStrategy};
//!
//! let strategy = FixedSizeStrategy::new(3).with_last_mile_length(2);
//! let mut queue: VecDeque<Test> = (0..7)
//!     .map(|i| Test::new("com.example", "MathTest", format!("case{}", i)))
//!     .collect();
//!
//! assert_eq!(strategy.process(&mut queue, &NoHistory, None).unwrap().len(), 3);
//! // 4 left: taking 3 would strand 1 test, so all 4 go together
//! assert_eq!(strategy.process(&mut queue, &NoHistory, None).unwrap().len(), 4);
//! assert!(queue.is_empty());
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::trace;

use super::BatchingStrategy;
use crate::analytics::Analytics;
use crate::model::{BundleId, Test, TestBatch};

/// Upper bound on a batch's estimated duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationBudget {
    /// Total estimated duration a batch may reach.
    pub limit: Duration,

    /// Percentile (0-100] of each test's history used as its estimate.
    pub percentile: f64,
}

/// Batches up to `size` tests in queue order.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedSizeStrategy {
    size: usize,
    budget: Option<DurationBudget>,
    time_limit: Option<DateTime<Utc>>,
    last_mile_length: usize,
}

impl FixedSizeStrategy {
    /// Creates a strategy producing batches of at most `size` tests.
    ///
    /// Sizes below 1 are clamped to 1.
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            budget: None,
            time_limit: None,
            last_mile_length: 0,
        }
    }

    /// Bounds each batch by estimated duration.
    pub fn with_duration_budget(mut self, budget: DurationBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Restricts duration estimates to history recorded at or after `since`.
    pub fn with_time_limit(mut self, since: DateTime<Utc>) -> Self {
        self.time_limit = Some(since);
        self
    }

    /// Merges the remainder into the current batch when fewer than
    /// `length` tests would be left behind.
    pub fn with_last_mile_length(mut self, length: usize) -> Self {
        self.last_mile_length = length;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn budget(&self) -> Option<&DurationBudget> {
        self.budget.as_ref()
    }

    pub fn time_limit(&self) -> Option<DateTime<Utc>> {
        self.time_limit
    }

    pub fn last_mile_length(&self) -> usize {
        self.last_mile_length
    }
}

impl BatchingStrategy for FixedSizeStrategy {
    fn name(&self) -> &'static str {
        "fixed-size"
    }

    fn process(
        &self,
        queue: &mut VecDeque<Test>,
        analytics: &dyn Analytics,
        _bundle: Option<&BundleId>,
    ) -> Option<TestBatch> {
        let mut tests = Vec::with_capacity(self.size.min(queue.len()));
        let mut estimated = Duration::ZERO;

        while tests.len() < self.size {
            let Some(next) = queue.front() else {
                break;
            };

            if let Some(budget) = &self.budget {
                let cost = analytics
                    .estimated_duration(next, budget.percentile, self.time_limit)
                    .unwrap_or_default();
                let total = estimated.saturating_add(cost);
                if !tests.is_empty() && total > budget.limit {
                    trace!(
                        "Budget of {:?} reached after {} tests ({:?})",
                        budget.limit,
                        tests.len(),
                        estimated
                    );
                    break;
                }
                estimated = total;
            }

            if let Some(test) = queue.pop_front() {
                tests.push(test);
            }
        }

        if !queue.is_empty() && queue.len() < self.last_mile_length {
            trace!("Absorbing last {} tests into the current batch", queue.len());
            tests.extend(queue.drain(..));
        }

        if tests.is_empty() {
            return None;
        }
        Some(TestBatch::new(tests))
    }
}
