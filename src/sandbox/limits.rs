//! Resource limits and the interrupt handle shared with the worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::VizConfig;

/// Limits applied to one snippet execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Wall-clock deadline.
    pub timeout: Duration,
    /// Interpreter steps before the snippet is stopped.
    pub step_budget: u64,
    /// Largest list, array, string or range a snippet may build.
    pub max_collection_len: usize,
    /// Elements a snippet may create in total, across every value and artist.
    pub max_total_elements: u64,
    /// How long a tripped worker gets to unwind before it is abandoned.
    pub grace: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from_config(&VizConfig::default())
    }
}

impl ResourceLimits {
    pub fn from_config(config: &VizConfig) -> Self {
        Self {
            timeout: config.execution_timeout(),
            step_budget: config.step_budget,
            max_collection_len: config.max_collection_len,
            max_total_elements: config.max_total_elements,
            grace: config.shutdown_grace(),
        }
    }

    pub fn with_step_budget(mut self, budget: u64) -> Self {
        self.step_budget = budget;
        self
    }

    pub fn with_max_total_elements(mut self, elements: u64) -> Self {
        self.max_total_elements = elements;
        self
    }
}

/// Cooperative stop flag polled by the interpreter on every step.
///
/// Cloning shares the flag; tripping any clone stops the worker at its next
/// statement, loop iteration or call.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    tripped: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_follow_config() {
        let config = VizConfig {
            execution_timeout_ms: 1500,
            step_budget: 99,
            max_collection_len: 10,
            max_total_elements: 500,
            ..VizConfig::default()
        };
        let limits = ResourceLimits::from_config(&config);
        assert_eq!(limits.timeout, Duration::from_millis(1500));
        assert_eq!(limits.step_budget, 99);
        assert_eq!(limits.max_collection_len, 10);
        assert_eq!(limits.max_total_elements, 500);
    }

    #[test]
    fn test_interrupt_is_shared_between_clones() {
        let handle = InterruptHandle::new();
        let worker_side = handle.clone();
        assert!(!worker_side.is_tripped());
        handle.trip();
        assert!(worker_side.is_tripped());
    }
}
