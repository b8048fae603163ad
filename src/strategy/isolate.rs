//! One test per batch.

use std::collections::VecDeque;

use super::BatchingStrategy;
use crate::analytics::Analytics;
use crate::model::{BundleId, Test, TestBatch};

/// Dispatches every test on its own.
///
/// Use this when no two tests may share a device session, e.g. for suites
/// full of flaky or resource-exclusive tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IsolateStrategy;

impl BatchingStrategy for IsolateStrategy {
    fn name(&self) -> &'static str {
        "isolate"
    }

    fn process(
        &self,
        queue: &mut VecDeque<Test>,
        _analytics: &dyn Analytics,
        _bundle: Option<&BundleId>,
    ) -> Option<TestBatch> {
        queue.pop_front().map(|test| TestBatch::new(vec![test]))
    }
}
