//! Batching by owning class.

use std::collections::VecDeque;

use super::{BatchingStrategy, take_matching};
use crate::analytics::Analytics;
use crate::model::{BundleId, Test, TestBatch};

/// Dispatches all queued tests of one class together.
///
/// The class is chosen from the test at the front of the queue. Every call
/// takes all currently queued members of that class, so a class is never
/// split across batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassNameStrategy;

impl BatchingStrategy for ClassNameStrategy {
    fn name(&self) -> &'static str {
        "class-name"
    }

    fn process(
        &self,
        queue: &mut VecDeque<Test>,
        _analytics: &dyn Analytics,
        _bundle: Option<&BundleId>,
    ) -> Option<TestBatch> {
        let pivot = queue.front()?.clone();
        let tests = take_matching(queue, |test| test.same_class(&pivot));
        Some(TestBatch::new(tests))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{assert_partition, ids, make_test, queue_of};
    use super::*;
    use crate::analytics::NoHistory;

    #[test]
    fn test_single_class_in_one_batch() {
        let mut queue = queue_of((0..5).map(|i| make_test("A", &i.to_string())).collect());

        let batch = ClassNameStrategy.process(&mut queue, &NoHistory, None).unwrap();

        assert_eq!(batch.len(), 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_groups_interleaved_classes() {
        let original = vec![
            make_test("A", "1"),
            make_test("B", "1"),
            make_test("A", "2"),
            make_test("C", "1"),
            make_test("B", "2"),
        ];
        let mut queue = queue_of(original.clone());

        let first = ClassNameStrategy.process(&mut queue, &NoHistory, None).unwrap();
        assert_eq!(ids(first.tests()), ["com.example.A#1", "com.example.A#2"]);
        assert_partition(&original, &first, &queue);

        let second = ClassNameStrategy.process(&mut queue, &NoHistory, None).unwrap();
        assert_eq!(ids(second.tests()), ["com.example.B#1", "com.example.B#2"]);

        let third = ClassNameStrategy.process(&mut queue, &NoHistory, None).unwrap();
        assert_eq!(ids(third.tests()), ["com.example.C#1"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_simple_name_in_other_package_is_separate() {
        let mut queue = queue_of(vec![
            Test::new("com.one", "Login", "a"),
            Test::new("com.two", "Login", "b"),
        ]);

        let batch = ClassNameStrategy.process(&mut queue, &NoHistory, None).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 1);
    }
}
