//! The shared queue of tests waiting for a device.
//!
//! A [`PendingQueue`] is populated once at the start of a run and drained by
//! device workers through [`select_batch`](PendingQueue::select_batch). Each
//! call runs the batching strategy while holding the queue lock, so the
//! strategy's inspect-then-remove sequence is atomic with respect to every
//! other worker: a test is handed out exactly once.
//!
//! # Example
//!
//! ```
//! use pacer::analytics::NoHistory;
//! use pacer::model::Test;
//! use pacer::queue::PendingQueue;
//! use pacer::strategy::ClassNameStrategy;
//!
//! let queue = PendingQueue::new(vec![
//!     Test::new("app", "LoginTest", "valid"),
//!     Test::new("app", "SearchTest", "empty"),
//!     Test::new("app", "LoginTest", "invalid"),
//! ]);
//!
//! let batch = queue.select_batch(&ClassNameStrategy, &NoHistory, None).unwrap();
//! assert_eq!(batch.len(), 2);
//! assert_eq!(queue.len(), 1);
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::analytics::Analytics;
use crate::model::{BundleId, Test, TestBatch};
use crate::strategy::BatchingStrategy;

/// Run-scoped queue of tests that have not been dispatched yet.
#[derive(Debug, Default)]
pub struct PendingQueue {
    tests: Mutex<VecDeque<Test>>,
}

impl PendingQueue {
    /// Creates a queue holding `tests` in iteration order.
    ///
    /// A test may appear only once; later duplicates are dropped.
    pub fn new(tests: impl IntoIterator<Item = Test>) -> Self {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for test in tests {
            if seen.insert(test.clone()) {
                queue.push_back(test);
            } else {
                warn!("Dropping duplicate test {}", test);
            }
        }

        Self {
            tests: Mutex::new(queue),
        }
    }

    /// Returns the number of pending tests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if every test has been dispatched.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a copy of the pending tests in queue order.
    pub fn snapshot(&self) -> Vec<Test> {
        self.lock().iter().cloned().collect()
    }

    /// Removes and returns the next batch chosen by `strategy`.
    ///
    /// Returns `None` once the queue is empty. Waiting for more work, or
    /// deciding that the run is over, is up to the caller.
    pub fn select_batch(
        &self,
        strategy: &dyn BatchingStrategy,
        analytics: &dyn Analytics,
        bundle: Option<&BundleId>,
    ) -> Option<TestBatch> {
        let mut queue = self.lock();
        if queue.is_empty() {
            return None;
        }

        let batch = strategy.process(&mut queue, analytics, bundle)?;
        debug!(
            "Selected batch {} with {} tests using {} ({} pending)",
            batch.id(),
            batch.len(),
            strategy.name(),
            queue.len()
        );
        Some(batch)
    }

    // Strategies never panic halfway through a mutation, so the data behind a
    // poisoned lock is still a valid queue.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Test>> {
        self.tests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FromIterator<Test> for PendingQueue {
    fn from_iter<I: IntoIterator<Item = Test>>(iter: I) -> Self {
        Self::new(iter)
    }
}
