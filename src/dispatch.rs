//! Handing batches to devices.
//!
//! The [`Dispatcher`] runs one worker per device. Whenever a worker is idle
//! it asks the shared [`PendingQueue`] for the next batch and passes it to
//! its [`Device`]. Workers stop when the queue is empty or the run is
//! cancelled.
//!
//! ```text
//!                      PendingQueue
//!                           │
//!          select_batch()   │   (one lock, one strategy call)
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//!    worker 0           worker 1           worker N
//!        │                  │                  │
//!   Device::execute    Device::execute    Device::execute
//! ```
//!
//! Device lifecycle, transport and retries are the device implementation's
//! business. A failed batch is logged and counted; its tests are not put
//! back in the queue.
//!
//! # Example
//!
//! ```no_run
//! use pacer::analytics::NoHistory;
//! use pacer::dispatch::{Dispatcher, SimulatedDevice};
//! use pacer::model::Test;
//! use pacer::queue::PendingQueue;
//! use pacer::strategy::ClassNameStrategy;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = PendingQueue::new(vec![Test::new("app", "LoginTest", "valid")]);
//!     let devices = vec![SimulatedDevice::new("emulator-5554")];
//!
//!     let dispatcher = Dispatcher::new(ClassNameStrategy, NoHistory);
//!     let summary = dispatcher
//!         .run(&queue, &devices, &CancellationToken::new())
//!         .await;
//!
//!     assert_eq!(summary.tests, 1);
//! }
//! ```

pub mod simulated;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::analytics::Analytics;
use crate::model::{BundleId, TestBatch};
use crate::queue::PendingQueue;
use crate::strategy::BatchingStrategy;

pub use simulated::SimulatedDevice;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported by a device while executing a batch.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device went away or refused work.
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// The batch ran but the device reported an infrastructure failure.
    #[error("Batch execution failed: {0}")]
    ExecutionFailed(String),

    /// Other device-related errors.
    #[error("Device error: {0}")]
    Other(#[from] anyhow::Error),
}

/// A device that executes batches.
///
/// Devices must be `Send + Sync`; the dispatcher shares them with the
/// worker tasks.
#[async_trait]
pub trait Device: Send + Sync {
    /// Returns the device's identifier, used in log output.
    fn id(&self) -> &str;

    /// Executes every test of `batch`. Returns once the batch is finished.
    async fn execute(&self, batch: &TestBatch) -> DeviceResult<()>;
}

/// What happened during one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Number of batches handed to devices.
    pub batches: usize,

    /// Number of tests across those batches.
    pub tests: usize,

    /// Batches whose device reported an error.
    pub failed_batches: usize,

    /// Tests still queued when the run ended (non-zero only when cancelled).
    pub remaining: usize,

    /// Whether the run was cancelled before the queue drained.
    pub cancelled: bool,

    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl DispatchSummary {
    /// Returns true if every test was dispatched and every batch succeeded.
    pub fn success(&self) -> bool {
        self.failed_batches == 0 && self.remaining == 0 && !self.cancelled
    }
}

/// Drives device workers against a shared queue.
///
/// # Type Parameters
///
/// - `S`: The batching strategy
/// - `A`: The analytics provider used for duration estimates
pub struct Dispatcher<S, A> {
    strategy: S,
    analytics: A,
    bundle: Option<BundleId>,
}

impl<S, A> Dispatcher<S, A>
where
    S: BatchingStrategy,
    A: Analytics,
{
    /// Creates a dispatcher for the given strategy and analytics provider.
    pub fn new(strategy: S, analytics: A) -> Self {
        Self {
            strategy,
            analytics,
            bundle: None,
        }
    }

    /// Passes `bundle` to every strategy call.
    pub fn with_bundle(mut self, bundle: BundleId) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Returns the strategy in use.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Runs one worker per device until `queue` is empty or `cancel` fires.
    ///
    /// Cancellation is checked before each batch is selected. Batches that
    /// were already handed to a device run to completion.
    ///
    /// Must be called from a multi-threaded tokio runtime.
    pub async fn run<D: Device>(
        &self,
        queue: &PendingQueue,
        devices: &[D],
        cancel: &CancellationToken,
    ) -> DispatchSummary {
        let start = Instant::now();
        let batches = AtomicUsize::new(0);
        let tests = AtomicUsize::new(0);
        let failed_batches = AtomicUsize::new(0);

        info!(
            "Dispatching {} tests to {} devices using {}",
            queue.len(),
            devices.len(),
            self.strategy.name()
        );

        tokio_scoped::scope(|scope| {
            for device in devices {
                let strategy = &self.strategy;
                let analytics = &self.analytics;
                let bundle = self.bundle.as_ref();
                let batches = &batches;
                let tests = &tests;
                let failed_batches = &failed_batches;

                scope.spawn(async move {
                    let mut executed = 0usize;
                    loop {
                        if cancel.is_cancelled() {
                            debug!("Device {} stopping: run cancelled", device.id());
                            break;
                        }

                        let Some(batch) = queue.select_batch(strategy, analytics, bundle) else {
                            break;
                        };

                        batches.fetch_add(1, Ordering::Relaxed);
                        tests.fetch_add(batch.len(), Ordering::Relaxed);
                        executed += 1;

                        debug!(
                            "Device {} executing batch {} ({} tests)",
                            device.id(),
                            batch.id(),
                            batch.len()
                        );
                        if let Err(e) = device.execute(&batch).await {
                            error!(
                                "Batch {} failed on device {}: {}",
                                batch.id(),
                                device.id(),
                                e
                            );
                            failed_batches.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    debug!("Device {} idle after {} batches", device.id(), executed);
                });
            }
        });

        let remaining = queue.len();
        let summary = DispatchSummary {
            batches: batches.into_inner(),
            tests: tests.into_inner(),
            failed_batches: failed_batches.into_inner(),
            remaining,
            cancelled: cancel.is_cancelled() && remaining > 0,
            duration: start.elapsed(),
        };

        info!(
            "Dispatched {} tests in {} batches ({} failed, {} remaining)",
            summary.tests, summary.batches, summary.failed_batches, summary.remaining
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::NoHistory;
    use crate::model::{MetaProperty, Test};
    use crate::strategy::{
        AnnotationPattern, ClassNameStrategy, FixedSizeStrategy, IsolateStrategy, MixedStrategy,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn suite(n: usize) -> Vec<Test> {
        (0..n)
            .map(|i| {
                let test = Test::new("com.example", format!("Class{}", i % 13), format!("m{}", i));
                if i % 7 == 0 {
                    test.with_meta_property(MetaProperty::new("Isolate"))
                } else if i % 5 == 0 {
                    test.with_meta_property(
                        MetaProperty::new("Union").with_value("value", format!("u{}", i % 3)),
                    )
                } else {
                    test
                }
            })
            .collect()
    }

    fn dispatched_counts(devices: &[SimulatedDevice]) -> HashMap<Test, usize> {
        let mut counts = HashMap::new();
        for device in devices {
            for batch in device.batches() {
                for test in batch.into_tests() {
                    *counts.entry(test).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_test_dispatched_once() {
        let tests = suite(400);
        let queue = PendingQueue::new(tests.clone());
        let devices: Vec<_> = (0..8)
            .map(|i| SimulatedDevice::new(format!("device-{}", i)))
            .collect();
        let strategy = MixedStrategy::new(
            Some(AnnotationPattern::new("Isolate").unwrap()),
            Some(AnnotationPattern::new("Union").unwrap()),
        );

        let summary = Dispatcher::new(strategy, NoHistory)
            .run(&queue, &devices, &CancellationToken::new())
            .await;

        assert!(summary.success());
        assert_eq!(summary.tests, 400);
        let counts = dispatched_counts(&devices);
        assert_eq!(counts.len(), 400);
        assert!(counts.values().all(|&c| c == 1));
        assert!(tests.iter().all(|t| counts.contains_key(t)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_isolate_batch_count() {
        let queue = PendingQueue::new(suite(50));
        let devices: Vec<_> = (0..3)
            .map(|i| SimulatedDevice::new(format!("device-{}", i)))
            .collect();

        let summary = Dispatcher::new(IsolateStrategy, NoHistory)
            .run(&queue, &devices, &CancellationToken::new())
            .await;

        assert_eq!(summary.batches, 50);
        assert_eq!(summary.tests, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_run_dispatches_nothing() {
        let queue = PendingQueue::new(suite(20));
        let devices = vec![SimulatedDevice::new("device-0")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = Dispatcher::new(FixedSizeStrategy::new(5), NoHistory)
            .run(&queue, &devices, &cancel)
            .await;

        assert!(summary.cancelled);
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.remaining, 20);
        assert!(!summary.success());
    }

    struct FlakyDevice {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Device for FlakyDevice {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn execute(&self, _batch: &TestBatch) -> DeviceResult<()> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls % 2 == 0 {
                return Err(DeviceError::ExecutionFailed("device rebooted".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_batches_are_counted_not_requeued() {
        let queue = PendingQueue::new(suite(26));
        let devices = vec![FlakyDevice {
            calls: Mutex::new(0),
        }];

        // 13 classes in suite(26) when annotations are ignored
        let summary = Dispatcher::new(ClassNameStrategy, NoHistory)
            .run(&queue, &devices, &CancellationToken::new())
            .await;

        assert_eq!(summary.batches, 13);
        assert_eq!(summary.failed_batches, 6);
        assert_eq!(summary.remaining, 0);
        assert!(!summary.success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bundle_is_passed_through() {
        #[derive(Debug)]
        struct BundleSpy(Mutex<Vec<Option<String>>>);

        impl BatchingStrategy for BundleSpy {
            fn name(&self) -> &'static str {
                "spy"
            }

            fn process(
                &self,
                queue: &mut std::collections::VecDeque<Test>,
                analytics: &dyn Analytics,
                bundle: Option<&BundleId>,
            ) -> Option<TestBatch> {
                self.0
                    .lock()
                    .unwrap()
                    .push(bundle.map(|b| b.as_str().to_string()));
                IsolateStrategy.process(queue, analytics, bundle)
            }
        }

        let queue = PendingQueue::new(suite(2));
        let devices = vec![SimulatedDevice::new("device-0")];
        let dispatcher = Dispatcher::new(BundleSpy(Mutex::new(Vec::new())), NoHistory)
            .with_bundle(BundleId::new("app-debug.apk"));

        dispatcher
            .run(&queue, &devices, &CancellationToken::new())
            .await;

        let seen = dispatcher.strategy().0.lock().unwrap().clone();
        assert_eq!(seen, vec![Some("app-debug.apk".to_string()); 2]);
    }
}
