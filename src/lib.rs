//! pacer: test batching for device farms.
//!
//! This crate decides which tests a device runs next. Tests wait in a shared
//! queue; whenever a device is free, a batching strategy removes a group of
//! them and the group is handed to that device as one batch.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Model**: Tests, their annotations, and batches
//! - **Queue**: The shared pending queue and atomic batch selection
//! - **Strategy**: Fixed-size, isolate, class-name and mixed batching
//! - **Analytics**: Historical duration estimates for budgeted batching
//! - **Dispatch**: One worker per device, draining the queue
//! - **Config**: TOML configuration selecting and validating a strategy
//!
//! # Example
//!
//! ```no_run
//! use pacer::analytics::DurationHistory;
//! use pacer::config::load_config;
//! use pacer::dispatch::{Dispatcher, SimulatedDevice};
//! use pacer::queue::PendingQueue;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("pacer.toml"))?;
//!     let strategy = config.batching.build()?;
//!     let history = match &config.analytics.history_file {
//!         Some(path) => DurationHistory::load(path),
//!         None => DurationHistory::default(),
//!     };
//!
//!     let queue = PendingQueue::new(Vec::new());
//!     let devices: Vec<_> = (0..config.pacer.devices)
//!         .map(|i| SimulatedDevice::new(format!("device-{}", i)))
//!         .collect();
//!
//!     Dispatcher::new(strategy, history)
//!         .run(&queue, &devices, &CancellationToken::new())
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod dispatch;
pub mod model;
pub mod queue;
pub mod strategy;

// Re-export commonly used types
pub use analytics::{Analytics, DurationHistory, NoHistory};
pub use config::{Config, load_config};
pub use dispatch::{Device, DispatchSummary, Dispatcher};
pub use model::{BundleId, MetaProperty, Test, TestBatch};
pub use queue::PendingQueue;
pub use strategy::{BatchingStrategy, Strategy};
