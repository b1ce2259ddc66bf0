//! Metric logger traits and composites.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Sink for scalar metrics keyed by name and step.
pub trait MetricLogger: Send + Sync {
    /// Log one scalar (e.g. `path/return`).
    fn log_scalar(&self, name: &str, value: f64, step: u64);

    /// Log several scalars recorded at the same step.
    fn log_metrics(&self, metrics: &BTreeMap<String, f64>, step: u64) {
        for (name, value) in metrics {
            self.log_scalar(name, *value, step);
        }
    }

    /// Flush any pending writes.
    fn close(&self) {}
}

/// A logger that does nothing (default).
pub struct NoOpLogger;

impl MetricLogger for NoOpLogger {
    fn log_scalar(&self, _name: &str, _value: f64, _step: u64) {}
    fn log_metrics(&self, _metrics: &BTreeMap<String, f64>, _step: u64) {}
}

/// Keeps every logged scalar, in order.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(String, f64, u64)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values logged under `name`, in logging order.
    pub fn values(&self, name: &str) -> Vec<f64> {
        match self.records.lock() {
            Ok(records) => records
                .iter()
                .filter(|(n, _, _)| n == name)
                .map(|(_, v, _)| *v)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricLogger for RecordingLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        if let Ok(mut records) = self.records.lock() {
            records.push((name.to_string(), value, step));
        }
    }
}

impl<L: MetricLogger + ?Sized> MetricLogger for std::sync::Arc<L> {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        (**self).log_scalar(name, value, step)
    }

    fn log_metrics(&self, metrics: &BTreeMap<String, f64>, step: u64) {
        (**self).log_metrics(metrics, step)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// A composite logger that dispatches to multiple backends.
pub struct CompositeLogger {
    loggers: Vec<Box<dyn MetricLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: Vec<Box<dyn MetricLogger>>) -> Self {
        Self { loggers }
    }

    pub fn add(&mut self, logger: Box<dyn MetricLogger>) {
        self.loggers.push(logger);
    }
}

impl MetricLogger for CompositeLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        for logger in &self.loggers {
            logger.log_scalar(name, value, step);
        }
    }

    fn log_metrics(&self, metrics: &BTreeMap<String, f64>, step: u64) {
        for logger in &self.loggers {
            logger.log_metrics(metrics, step);
        }
    }

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(RecordingLogger::new());
        let b = Arc::new(RecordingLogger::new());
        let composite = CompositeLogger::new(vec![
            Box::new(Arc::clone(&a)),
            Box::new(Arc::clone(&b)),
            Box::new(NoOpLogger),
        ]);

        composite.log_scalar("path/return", 3.5, 10);
        let mut metrics = BTreeMap::new();
        metrics.insert("path/length".to_string(), 40.0);
        metrics.insert("path/return".to_string(), 1.0);
        composite.log_metrics(&metrics, 11);

        assert_eq!(a.values("path/return"), vec![3.5, 1.0]);
        assert_eq!(b.values("path/length"), vec![40.0]);
        assert_eq!(b.len(), 3);
    }
}
