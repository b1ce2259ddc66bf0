//! Metric reporting.
//!
//! Provides:
//! - `MetricLogger` trait for composable backends
//! - `ConsoleLogger`, which forwards metrics to `tracing`
//! - `RecordingLogger`, which keeps every value in memory
//! - `CompositeLogger` for fanning out to several backends

mod console;
mod logger;

pub use console::ConsoleLogger;
pub use logger::{CompositeLogger, MetricLogger, NoOpLogger, RecordingLogger};
