//! Batching strategies.
//!
//! A batching strategy decides which pending tests are dispatched together
//! the next time a device becomes idle. Each call removes a non-empty subset
//! of the queue and returns it as a [`TestBatch`].
//!
//! # Built-in Strategies
//!
//! | Strategy | Config `type` | Groups by |
//! |----------|---------------|-----------|
//! | [`FixedSizeStrategy`] | `fixed-size` | Count, optionally bounded by estimated duration |
//! | [`IsolateStrategy`] | `isolate` | Nothing: one test per batch |
//! | [`ClassNameStrategy`] | `class-name` | Owning class |
//! | [`MixedStrategy`] | `mixed` | Class for plain tests, union key for annotated ones |
//!
//! Strategies are plain values. Two strategies of the same kind built from
//! equal configuration compare equal.
//!
//! # Locking
//!
//! Strategies are handed the queue contents by
//! [`PendingQueue::select_batch`](crate::queue::PendingQueue::select_batch),
//! which holds the queue lock for the whole call. A strategy therefore sees
//! a consistent snapshot and may inspect and then remove tests freely.

pub mod class_name;
pub mod fixed_size;
pub mod isolate;
pub mod mixed;

#[cfg(test)]
mod test_utils;

use std::collections::VecDeque;
use std::fmt;

use crate::analytics::Analytics;
use crate::model::{BundleId, Test, TestBatch};

pub use class_name::ClassNameStrategy;
pub use fixed_size::{DurationBudget, FixedSizeStrategy};
pub use isolate::IsolateStrategy;
pub use mixed::{AnnotationPattern, MixedStrategy};

/// Selects the next batch from the pending tests.
///
/// Implementations must:
/// - remove exactly the returned tests from `queue`,
/// - preserve queue order within the batch,
/// - return `None` only when `queue` is empty,
/// - never block.
///
/// Strategies outside this crate build their batches with
/// [`TestBatch::from_tests`].
pub trait BatchingStrategy: Send + Sync + fmt::Debug {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Removes the next batch from `queue`.
    fn process(
        &self,
        queue: &mut VecDeque<Test>,
        analytics: &dyn Analytics,
        bundle: Option<&BundleId>,
    ) -> Option<TestBatch>;
}

/// The strategy selected for a run.
///
/// Built from [`BatchingStrategyConfig`](crate::config::BatchingStrategyConfig)
/// by [`build`](crate::config::BatchingStrategyConfig::build).
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    FixedSize(FixedSizeStrategy),
    Isolate(IsolateStrategy),
    ClassName(ClassNameStrategy),
    Mixed(MixedStrategy),
}

impl Strategy {
    fn inner(&self) -> &dyn BatchingStrategy {
        match self {
            Strategy::FixedSize(s) => s,
            Strategy::Isolate(s) => s,
            Strategy::ClassName(s) => s,
            Strategy::Mixed(s) => s,
        }
    }
}

impl BatchingStrategy for Strategy {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn process(
        &self,
        queue: &mut VecDeque<Test>,
        analytics: &dyn Analytics,
        bundle: Option<&BundleId>,
    ) -> Option<TestBatch> {
        self.inner().process(queue, analytics, bundle)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Removes every test matching `pred`, preserving order on both sides.
pub(crate) fn take_matching(
    queue: &mut VecDeque<Test>,
    mut pred: impl FnMut(&Test) -> bool,
) -> Vec<Test> {
    let mut taken = Vec::new();
    let mut rest = VecDeque::with_capacity(queue.len());
    for test in queue.drain(..) {
        if pred(&test) {
            taken.push(test);
        } else {
            rest.push_back(test);
        }
    }
    *queue = rest;
    taken
}

#[cfg(test)]
mod tests {
    use super::test_utils::{make_test, queue_of};
    use super::*;
    use crate::analytics::NoHistory;

    #[test]
    fn test_take_matching_preserves_order() {
        let mut queue = queue_of(vec![
            make_test("A", "1"),
            make_test("B", "1"),
            make_test("A", "2"),
            make_test("C", "1"),
            make_test("A", "3"),
        ]);

        let taken = take_matching(&mut queue, |t| t.class == "A");

        let taken: Vec<_> = taken.iter().map(|t| t.method.as_str()).collect();
        assert_eq!(taken, ["1", "2", "3"]);
        let rest: Vec<_> = queue.iter().map(|t| t.class.as_str()).collect();
        assert_eq!(rest, ["B", "C"]);
    }

    #[test]
    fn test_strategy_delegates() {
        let strategy = Strategy::Isolate(IsolateStrategy);
        let mut queue = queue_of(vec![make_test("A", "1"), make_test("A", "2")]);

        let batch = strategy.process(&mut queue, &NoHistory, None).unwrap();

        assert_eq!(strategy.name(), "isolate");
        assert_eq!(strategy.to_string(), "isolate");
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_every_strategy_returns_none_on_empty_queue() {
        let strategies = [
            Strategy::FixedSize(FixedSizeStrategy::new(3)),
            Strategy::Isolate(IsolateStrategy),
            Strategy::ClassName(ClassNameStrategy),
            Strategy::Mixed(MixedStrategy::new(None, None)),
        ];

        for strategy in strategies {
            let mut queue = VecDeque::new();
            assert!(
                strategy.process(&mut queue, &NoHistory, None).is_none(),
                "{} produced a batch from an empty queue",
                strategy
            );
        }
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(
            Strategy::FixedSize(FixedSizeStrategy::new(5).with_last_mile_length(2)),
            Strategy::FixedSize(FixedSizeStrategy::new(5).with_last_mile_length(2)),
        );
        assert_ne!(
            Strategy::FixedSize(FixedSizeStrategy::new(5)),
            Strategy::FixedSize(FixedSizeStrategy::new(6)),
        );
        assert_ne!(
            Strategy::Isolate(IsolateStrategy),
            Strategy::ClassName(ClassNameStrategy)
        );
    }
}
