//! In-process device that records the batches it receives.
//!
//! Used by `pacer plan` to preview a run and by tests to inspect dispatch
//! behavior. Nothing is executed; the device optionally sleeps per test to
//! simulate work, which lets other devices pick up batches in between.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use super::{Device, DeviceResult};
use crate::model::TestBatch;

/// A device that records batches instead of running them.
#[derive(Debug)]
pub struct SimulatedDevice {
    id: String,
    per_test_delay: Duration,
    batches: Mutex<Vec<TestBatch>>,
}

impl SimulatedDevice {
    /// Creates a device that completes batches immediately.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            per_test_delay: Duration::ZERO,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps for `delay` per test in each batch.
    pub fn with_per_test_delay(mut self, delay: Duration) -> Self {
        self.per_test_delay = delay;
        self
    }

    /// Returns the batches received so far, in order.
    pub fn batches(&self) -> Vec<TestBatch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Device for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, batch: &TestBatch) -> DeviceResult<()> {
        trace!("{}: received batch {}", self.id, batch.id());

        if !self.per_test_delay.is_zero() {
            let tests = u32::try_from(batch.len()).unwrap_or(u32::MAX);
            tokio::time::sleep(self.per_test_delay.saturating_mul(tests)).await;
        }

        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.clone());
        Ok(())
    }
}
