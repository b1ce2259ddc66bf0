//! Console logging backend.

use super::MetricLogger;
use std::collections::BTreeMap;

/// Logger that reports metrics through `tracing` at info level.
#[derive(Default)]
pub struct ConsoleLogger {
    prefix: Option<String>,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix/` to every metric name
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        }
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        tracing::info!(step, metric = %self.name(name), value, "metric");
    }

    fn log_metrics(&self, metrics: &BTreeMap<String, f64>, step: u64) {
        // One line per step
        let line = metrics
            .iter()
            .map(|(k, v)| format!("{}={:.4}", self.name(k), v))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("Step {}: {}", step, line);
    }
}
