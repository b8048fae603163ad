use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::analytics::Analytics;
use crate::model::{MetaProperty, Test, TestBatch};

pub(crate) fn make_test(class: &str, method: &str) -> Test {
    Test::new("com.example", class, method)
}

pub(crate) fn annotated(class: &str, method: &str, annotation: &str) -> Test {
    make_test(class, method).with_meta_property(MetaProperty::new(annotation))
}

pub(crate) fn union(class: &str, method: &str, annotation: &str, key: &str) -> Test {
    make_test(class, method)
        .with_meta_property(MetaProperty::new(annotation).with_value("value", key))
}

pub(crate) fn queue_of(tests: Vec<Test>) -> VecDeque<Test> {
    tests.into_iter().collect()
}

pub(crate) fn ids(tests: &[Test]) -> Vec<String> {
    tests.iter().map(Test::id).collect()
}

/// Asserts that `batch` and `remaining` split `before` without loss or duplication.
pub(crate) fn assert_partition(before: &[Test], batch: &TestBatch, remaining: &VecDeque<Test>) {
    assert!(!batch.is_empty(), "batch must not be empty");
    assert_eq!(batch.len() + remaining.len(), before.len());

    let mut seen = HashSet::new();
    for test in batch.tests().iter().chain(remaining.iter()) {
        assert!(seen.insert(test.clone()), "{} appears twice", test);
    }
    for test in before {
        assert!(seen.contains(test), "{} was lost", test);
    }
}

/// Fixed per-test estimates keyed by method name.
#[derive(Default)]
pub(crate) struct FixedEstimates {
    millis: HashMap<String, u64>,
}

impl FixedEstimates {
    pub(crate) fn with(mut self, method: &str, millis: u64) -> Self {
        self.millis.insert(method.to_string(), millis);
        self
    }
}

impl Analytics for FixedEstimates {
    fn estimated_duration(
        &self,
        test: &Test,
        _percentile: f64,
        _since: Option<DateTime<Utc>>,
    ) -> Option<Duration> {
        self.millis.get(&test.method).copied().map(Duration::from_millis)
    }
}
