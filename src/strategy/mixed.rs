//! Class grouping for plain tests, union grouping for annotated ones.
//!
//! The Mixed strategy looks at two annotation patterns:
//!
//! - **isolate**: tests carrying a matching annotation always run alone.
//! - **union**: tests carrying a matching annotation run together with every
//!   other test whose matching annotation has the same `value`.
//!
//! Each call tries, in order:
//!
//! 1. The first unannotated test's class: all queued unannotated tests of
//!    that class form the batch.
//! 2. The first union-annotated test's key: all queued tests with a
//!    union annotation of that key form the batch.
//! 3. The front test alone.
//!
//! Isolate-annotated tests are excluded from both groupings, so they only
//! ever leave the queue through step 3.
//!
//! # Example
//!
//! ```
//! use std::collections::VecDeque;
//! use pacer::analytics::NoHistory;
//! use pacer::model::{MetaProperty, Test};
//! use pacer::strategy::{AnnotationPattern, BatchingStrategy, MixedStrategy};
//!
//! let strategy = MixedStrategy::new(
//!     Some(AnnotationPattern::new("Isolate")?),
//!     Some(AnnotationPattern::new("Union")?),
//! );
//! let mut queue = VecDeque::from(vec![
//!     Test::new("app", "Checkout", "pay")
//!         .with_meta_property(MetaProperty::new("Union").with_value("value", "payments")),
//!     Test::new("app", "Refund", "full")
//!         .with_meta_property(MetaProperty::new("Union").with_value("value", "payments")),
//!     Test::new("app", "Search", "query"),
//! ]);
//!
//! let first = strategy.process(&mut queue, &NoHistory, None).unwrap();
//! assert_eq!(first.tests()[0].method, "query");
//!
//! let second = strategy.process(&mut queue, &NoHistory, None).unwrap();
//! assert_eq!(second.len(), 2);
//! # Ok::<(), regex::Error>(())
//! ```

use std::collections::VecDeque;
use std::fmt;

use regex::Regex;
use tracing::trace;

use super::{BatchingStrategy, take_matching};
use crate::analytics::Analytics;
use crate::model::{BundleId, MetaProperty, Test, TestBatch};

/// Key inside a union annotation holding the group name.
const UNION_KEY: &str = "value";

/// A regular expression matched against the whole annotation name.
///
/// `Flaky` matches `Flaky` but not `NotFlaky`; use `.*Flaky` for a suffix
/// match.
#[derive(Clone)]
pub struct AnnotationPattern {
    source: String,
    regex: Regex,
}

impl AnnotationPattern {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns the pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the whole of `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl PartialEq for AnnotationPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for AnnotationPattern {}

impl fmt::Debug for AnnotationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnnotationPattern")
            .field(&self.source)
            .finish()
    }
}

impl fmt::Display for AnnotationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Groups plain tests by class and annotated tests by union key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedStrategy {
    isolate: Option<AnnotationPattern>,
    union: Option<AnnotationPattern>,
}

impl MixedStrategy {
    /// Creates the strategy. An absent pattern matches no annotation.
    pub fn new(isolate: Option<AnnotationPattern>, union: Option<AnnotationPattern>) -> Self {
        Self { isolate, union }
    }

    pub fn isolate_pattern(&self) -> Option<&AnnotationPattern> {
        self.isolate.as_ref()
    }

    pub fn union_pattern(&self) -> Option<&AnnotationPattern> {
        self.union.as_ref()
    }

    fn is_isolate(&self, property: &MetaProperty) -> bool {
        self.isolate
            .as_ref()
            .is_some_and(|p| p.matches(&property.name))
    }

    fn is_union(&self, property: &MetaProperty) -> bool {
        self.union.as_ref().is_some_and(|p| p.matches(&property.name))
    }

    fn is_plain(&self, test: &Test) -> bool {
        test.meta_properties
            .iter()
            .all(|p| !self.is_isolate(p) && !self.is_union(p))
    }

    /// Union key of the first union annotation on `test`.
    ///
    /// The outer `Option` is whether the test has a union annotation at all;
    /// the inner one is the annotation's `value`, which may be missing.
    fn union_key<'t>(&self, test: &'t Test) -> Option<Option<&'t str>> {
        test.meta_properties
            .iter()
            .find(|p| self.is_union(p))
            .map(|p| p.value(UNION_KEY))
    }

    fn in_union(&self, test: &Test, key: Option<&str>) -> bool {
        test.meta_properties
            .iter()
            .any(|p| self.is_union(p) && p.value(UNION_KEY) == key)
    }
}

impl BatchingStrategy for MixedStrategy {
    fn name(&self) -> &'static str {
        "mixed"
    }

    fn process(
        &self,
        queue: &mut VecDeque<Test>,
        _analytics: &dyn Analytics,
        _bundle: Option<&BundleId>,
    ) -> Option<TestBatch> {
        if let Some(pivot) = queue.iter().find(|t| self.is_plain(t)).cloned() {
            let tests = take_matching(queue, |t| t.same_class(&pivot) && self.is_plain(t));
            trace!("Grouped {} plain tests of {}", tests.len(), pivot.class_name());
            return Some(TestBatch::new(tests));
        }

        let key = queue
            .iter()
            .find_map(|t| self.union_key(t))
            .map(|key| key.map(str::to_owned));
        if let Some(key) = key {
            let tests = take_matching(queue, |t| self.in_union(t, key.as_deref()));
            trace!("Grouped {} tests of union {:?}", tests.len(), key);
            return Some(TestBatch::new(tests));
        }

        queue.pop_front().map(|test| TestBatch::new(vec![test]))
    }
}
