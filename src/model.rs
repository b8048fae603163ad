//! Value types flowing through the pending queue.
//!
//! A [`Test`] identifies one executable test case. Tests carry a list of
//! [`MetaProperty`] entries describing the annotations attached to them;
//! batching strategies inspect these to decide which tests may share a
//! [`TestBatch`].
//!
//! # Identity
//!
//! Two tests are equal when they have the same package, class and method.
//! Annotation content takes no part in equality or hashing, so a queue can
//! deduplicate tests that were discovered twice with different markers.
//!
//! # Example
//!
//! ```
//! use pacer::model::{MetaProperty, Test};
//!
//! let test = Test::new("com.example", "LoginTest", "validPassword")
//!     .with_meta_property(MetaProperty::new("Flaky"))
//!     .with_meta_property(MetaProperty::new("Union").with_value("value", "auth"));
//!
//! assert_eq!(test.class_name(), "com.example.LoginTest");
//! assert_eq!(test.id(), "com.example.LoginTest#validPassword");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named annotation or marker attached to a test.
///
/// The `values` map holds the annotation's named arguments, e.g. an
/// annotation `@Union("groupA")` is represented with name `Union` and
/// values `{"value": "groupA"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaProperty {
    /// Annotation or marker name.
    pub name: String,

    /// Named arguments of the annotation.
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl MetaProperty {
    /// Creates a meta-property with no values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    /// Adds a named value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns the value stored under `key`, if any.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// One executable test case.
///
/// Tests are immutable once built. Use the builder methods to attach
/// meta-properties before the test is placed in a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    /// Package (or module path) the class lives in. May be empty.
    #[serde(default)]
    pub package: String,

    /// Simple name of the owning class.
    pub class: String,

    /// Test method name.
    pub method: String,

    /// Annotations attached to the test.
    #[serde(default)]
    pub meta_properties: Vec<MetaProperty>,
}

impl Test {
    /// Creates a test without meta-properties.
    pub fn new(
        package: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
            method: method.into(),
            meta_properties: Vec::new(),
        }
    }

    /// Attaches a meta-property.
    pub fn with_meta_property(mut self, property: MetaProperty) -> Self {
        self.meta_properties.push(property);
        self
    }

    /// Returns the fully-qualified class name (`package.Class`).
    ///
    /// When the package is empty this is just the class name.
    pub fn class_name(&self) -> String {
        if self.package.is_empty() {
            self.class.clone()
        } else {
            format!("{}.{}", self.package, self.class)
        }
    }

    /// Returns the unique identifier (`package.Class#method`).
    pub fn id(&self) -> String {
        format!("{}#{}", self.class_name(), self.method)
    }

    /// Returns true if this test belongs to the same class as `other`.
    pub fn same_class(&self, other: &Test) -> bool {
        self.package == other.package && self.class == other.class
    }
}

impl PartialEq for Test {
    fn eq(&self, other: &Self) -> bool {
        self.package == other.package && self.class == other.class && self.method == other.method
    }
}

impl Eq for Test {}

impl Hash for Test {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.package.hash(state);
        self.class.hash(state);
        self.method.hash(state);
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name(), self.method)
    }
}

/// An ordered, immutable group of tests dispatched together to one device.
///
/// Batches are produced only by batching strategies and are never empty.
#[derive(Debug, Clone)]
pub struct TestBatch {
    id: Uuid,
    tests: Vec<Test>,
}

impl TestBatch {
    /// Builds a batch for a custom strategy. Returns `None` if `tests` is
    /// empty.
    pub fn from_tests(tests: Vec<Test>) -> Option<Self> {
        (!tests.is_empty()).then(|| Self::new(tests))
    }

    pub(crate) fn new(tests: Vec<Test>) -> Self {
        debug_assert!(!tests.is_empty(), "batches are never empty");
        Self {
            id: Uuid::new_v4(),
            tests,
        }
    }

    /// Returns the batch identifier, used to correlate log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the tests in dispatch order.
    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    /// Returns the number of tests in this batch.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Always false for batches produced by a strategy.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Consumes the batch, returning its tests.
    pub fn into_tests(self) -> Vec<Test> {
        self.tests
    }
}

/// Opaque token grouping tests by the artifact they were built from.
///
/// Passed through to strategies untouched. None of the built-in strategies
/// look at it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(String);

impl BundleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
