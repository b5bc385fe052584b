//! Logging and tracing initialization.
//!
//! Logs go to stderr so that command output (inventory tables, transfer
//! summaries) stays clean on stdout. Pretty output by default, JSON with
//! `--json-logs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogConfig {
    /// One JSON object per event, spans closed with timings.
    pub json: bool,
    /// Default level DEBUG instead of INFO.
    pub verbose: bool,
}

/// Install the global subscriber. Call once, after config is loaded.
///
/// `RUST_LOG` overrides the level chosen by `verbose`.
///
/// ```ignore
/// stickcp::logging::init(LogConfig { verbose: true, ..Default::default() });
/// ```
pub fn init(config: LogConfig) {
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stickcp={}", level.as_str().to_lowercase())));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}

const NEVER_LOGGED: u64 = u64::MAX;

/// Lets one message through per interval.
///
/// Used for mirror progress, which the mirror tool reports many times a
/// second.
pub struct LogThrottle {
    interval_ms: u64,
    last_ms: AtomicU64,
    start: Instant,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            last_ms: AtomicU64::new(NEVER_LOGGED),
            start: Instant::now(),
        }
    }

    pub fn should_log(&self) -> bool {
        let now = self.start.elapsed().as_millis() as u64;
        let last = self.last_ms.load(Ordering::Relaxed);

        if last != NEVER_LOGGED && now.saturating_sub(last) < self.interval_ms {
            return false;
        }

        self.last_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}
