//! Performance timers for kernel launches and transfers.
//!
//! ```rust
//! use feedfwd_tracing::performance::PerformanceSpan;
//!
//! let span = PerformanceSpan::new("set_const_val", Some(100));
//! // ... launch ...
//! drop(span); // logged only if it took at least 100µs
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const NO_THRESHOLD: u64 = u64::MAX;

static GLOBAL_THRESHOLD_US: AtomicU64 = AtomicU64::new(NO_THRESHOLD);

/// Threshold applied by [`crate::perf_span!`]; set by [`crate::init_global_tracing`].
pub fn set_global_threshold(threshold_us: Option<u64>) {
    GLOBAL_THRESHOLD_US.store(threshold_us.unwrap_or(NO_THRESHOLD), Ordering::Relaxed);
}

pub fn global_threshold() -> Option<u64> {
    match GLOBAL_THRESHOLD_US.load(Ordering::Relaxed) {
        NO_THRESHOLD => None,
        threshold => Some(threshold),
    }
}

/// RAII timer; logs its duration at `debug` level when dropped.
///
/// With a threshold set, spans that finish faster than the threshold are
/// dropped silently.
#[derive(Debug)]
pub struct PerformanceSpan {
    threshold_us: Option<u64>,
    start_time: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Start timing `span_name`.
    pub fn new(span_name: &str, threshold_us: Option<u64>) -> Self {
        Self {
            threshold_us,
            start_time: Instant::now(),
            span: tracing::debug_span!("perf", name = %span_name),
        }
    }

    /// Microseconds since the span was created.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.map_or(true, |threshold| elapsed_us >= threshold) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Record a host/device transfer.
pub fn record_transfer(direction: &'static str, bytes: usize, duration_us: u64) {
    let bandwidth_mbps = if duration_us > 0 {
        (bytes as f64 / duration_us as f64) * 1_000_000.0 / (1024.0 * 1024.0)
    } else {
        0.0
    };

    tracing::debug!(
        direction = direction,
        bytes = bytes,
        duration_us = duration_us,
        bandwidth_mbps = bandwidth_mbps,
        "transfer_complete"
    );
}
