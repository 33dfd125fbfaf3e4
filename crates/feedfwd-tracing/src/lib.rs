//! Shared tracing configuration for the feedfwd workspace.
//!
//! Binaries, benchmarks and integration tests install their `tracing`
//! subscriber through this crate so the log surface of the network core looks
//! the same wherever it runs. Kernel and transfer timings are emitted as
//! `debug` events; see [`performance`] for the RAII timers used on hot paths.

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;

#[doc(hidden)]
pub use tracing;
pub use tracing::{debug, error, info, trace, warn};

use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Output format of the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    /// Multi-line, human oriented.
    Pretty,
    /// Single-line text.
    Compact,
    /// Newline-delimited JSON objects.
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// How the process-wide subscriber should behave.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives (e.g. `feedfwd_core=debug,info`). Falls back to
    /// `RUST_LOG`, then to [`TracingConfig::default_directive`].
    pub directives: Option<String>,
    /// Directive used when nothing else resolves to a valid filter.
    pub default_directive: String,
    /// Print event targets (module paths).
    pub include_targets: bool,
    /// ANSI colours. Always off for JSON output.
    pub ansi: bool,
    /// Span lifecycle events to emit.
    pub span_events: FmtSpan,
    /// Formatter layer output.
    pub output: TracingOutput,
    /// Performance spans shorter than this are not logged.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Pretty, coloured output for local development.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            performance_threshold_us: None,
        }
    }

    /// JSON without colours, for CI and log collectors.
    pub fn for_ci() -> Self {
        Self {
            ansi: false,
            output: TracingOutput::Json,
            ..Self::for_local()
        }
    }

    /// Debug-level kernel and transfer timings with span close events.
    pub fn for_performance() -> Self {
        Self {
            directives: Some("feedfwd_backends=debug,feedfwd_core=debug".to_string()),
            ansi: false,
            span_events: FmtSpan::CLOSE,
            output: TracingOutput::Json,
            ..Self::for_local()
        }
    }

    /// Build a configuration from environment hints.
    ///
    /// - `FEEDFWD_TRACING_PROFILE`: `local` (default), `ci` or `performance`
    /// - `FEEDFWD_TRACING_DIRECTIVES`: overrides the filter directives
    /// - `FEEDFWD_TRACING_FORMAT`: `pretty`, `compact` or `json`
    /// - `FEEDFWD_PERF_THRESHOLD_US`: minimum span duration to log
    pub fn from_env() -> Self {
        let profile = env::var("FEEDFWD_TRACING_PROFILE")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase();

        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "performance" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Ok(directives) = env::var("FEEDFWD_TRACING_DIRECTIVES") {
            if !directives.trim().is_empty() {
                config.directives = Some(directives);
            }
        }

        if let Some(output) = env::var("FEEDFWD_TRACING_FORMAT")
            .ok()
            .and_then(|value| TracingOutput::from_env_value(&value))
        {
            config.output = output;
            if output == TracingOutput::Json {
                config.ansi = false;
            }
        }

        if let Some(threshold) = env::var("FEEDFWD_PERF_THRESHOLD_US")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            config.performance_threshold_us = Some(threshold);
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Failure to configure the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    /// The directive string could not be parsed.
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),
    /// A global subscriber is already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Build a subscriber for `config` without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.resolve_filter()?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.output {
        TracingOutput::Pretty => Box::new(
            tracing_fmt::layer()
                .pretty()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(config.span_events.clone()),
        ),
        TracingOutput::Compact => Box::new(
            tracing_fmt::layer()
                .compact()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(config.span_events.clone()),
        ),
        TracingOutput::Json => Box::new(
            tracing_fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_ansi(false)
                .with_span_events(config.span_events.clone()),
        ),
    };

    Ok(Registry::default().with(layer).with(filter))
}

/// Install the configured subscriber as the process-wide default.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?.try_init()?;
    performance::set_global_threshold(config.performance_threshold_us);
    Ok(())
}
