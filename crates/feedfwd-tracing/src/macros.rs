//! Shorthand for the performance helpers.

/// Open a [`crate::performance::PerformanceSpan`], optionally inside a
/// `debug` span carrying extra fields. Honours the global threshold set by
/// [`crate::init_global_tracing`].
///
/// ```rust
/// use feedfwd_tracing::perf_span;
///
/// let _span = perf_span!("hadamard_multiply", n = 1024);
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::new($name, $crate::performance::global_threshold())
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        let _fields = $crate::tracing::debug_span!(
            "perf",
            name = $name,
            $($field = $value),+
        )
        .entered();
        $crate::performance::PerformanceSpan::new($name, $crate::performance::global_threshold())
    }};
}

/// Emit a `debug` event tagged with `event = $name`.
///
/// ```rust
/// use feedfwd_tracing::perf_event;
///
/// perf_event!("buffer_released", bytes = 4096);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        $crate::tracing::debug!(
            event = $name,
            $($field = $value),+
        );
    };
}
