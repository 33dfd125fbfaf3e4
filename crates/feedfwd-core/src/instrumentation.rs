//! Per-operation execution metrics
//!
//! ```text
//! let start = std::time::Instant::now();
//! // ... launch kernel ...
//! ExecutionMetrics::new("set_const_val", lx, start).log();
//! ```

use std::time::Instant;

/// Timing record for one kernel wrapper or orchestration step
#[derive(Debug, Clone)]
pub struct ExecutionMetrics {
    /// Operation name (e.g. "hadamard_multiply", "feedforward")
    pub operation_name: String,
    /// Wall time from issue to return, in microseconds
    pub total_duration_us: u64,
    /// Logical element count (Lx for kernels, `n_out * m` for a layer)
    pub elements: usize,
}

impl ExecutionMetrics {
    pub fn new(operation_name: impl Into<String>, elements: usize, start: Instant) -> Self {
        Self {
            operation_name: operation_name.into(),
            total_duration_us: start.elapsed().as_micros() as u64,
            elements,
        }
    }

    /// Millions of elements per second
    pub fn throughput_meps(&self) -> f64 {
        if self.total_duration_us == 0 {
            return 0.0;
        }
        self.elements as f64 / self.total_duration_us as f64
    }

    pub fn log(&self) {
        tracing::debug!(
            operation = %self.operation_name,
            duration_us = self.total_duration_us,
            elements = self.elements,
            throughput_meps = self.throughput_meps(),
            "execution_complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_handles_zero_duration() {
        let metrics = ExecutionMetrics {
            operation_name: "noop".to_string(),
            total_duration_us: 0,
            elements: 100,
        };
        assert_eq!(metrics.throughput_meps(), 0.0);
    }

    #[test]
    fn test_throughput_is_elements_per_microsecond() {
        let metrics = ExecutionMetrics {
            operation_name: "fill".to_string(),
            total_duration_us: 4,
            elements: 2_000,
        };
        assert!((metrics.throughput_meps() - 500.0).abs() < 1e-9);
    }
}
