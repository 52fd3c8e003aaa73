use std::io::Write;
use std::time::Duration;

use serde::Serialize;

use crate::config::timeouts::{
    DEFAULT_BOOT_DELAY_MS, DEFAULT_CALC_TIMEOUT_MS, DEFAULT_DEBOUNCE_MS, DEFAULT_FORMAT_TIMEOUT_MS,
    DEFAULT_SOLVE_TIMEOUT_MS,
};
use crate::router::Timeouts;

pub const APP_NAME: &str = "polysolve";

// ----------------------------------------------------------------------------
// Host configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    /// Quiet period before an edited coefficient string is re-formatted.
    pub debounce: Duration,
    pub timeouts: Timeouts,
    /// Simulated warm-up of the built-in numeric runtime.
    pub boot_delay: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            timeouts: Timeouts::default(),
            boot_delay: Duration::from_millis(DEFAULT_BOOT_DELAY_MS),
        }
    }
}

fn env_millis(name: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

impl HostConfig {
    /// Load configuration from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - POLYSOLVE_DEBOUNCE_MS: format preview debounce window (default: 400)
    /// - POLYSOLVE_FORMAT_TIMEOUT_MS: timeout for `format` requests (default: 10000)
    /// - POLYSOLVE_CALC_TIMEOUT_MS: timeout for evaluate/derivative/nth_derivative/add/multiply (default: 30000)
    /// - POLYSOLVE_SOLVE_TIMEOUT_MS: timeout for `solve` (default: 120000)
    /// - POLYSOLVE_BOOT_DELAY_MS: simulated runtime warm-up (default: 0)
    pub fn from_env() -> Self {
        Self {
            debounce: env_millis("POLYSOLVE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS),
            timeouts: Timeouts {
                format: env_millis("POLYSOLVE_FORMAT_TIMEOUT_MS", DEFAULT_FORMAT_TIMEOUT_MS),
                calculation: env_millis("POLYSOLVE_CALC_TIMEOUT_MS", DEFAULT_CALC_TIMEOUT_MS),
                solve: env_millis("POLYSOLVE_SOLVE_TIMEOUT_MS", DEFAULT_SOLVE_TIMEOUT_MS),
            },
            boot_delay: env_millis("POLYSOLVE_BOOT_DELAY_MS", DEFAULT_BOOT_DELAY_MS),
        }
    }
}

// ----------------------------------------------------------------------------
// Tracing
// ----------------------------------------------------------------------------

/// Install the fmt subscriber (stderr, `RUST_LOG` filter). Safe to call repeatedly.
pub fn init_tracing_subsystem() {
    #[cfg(feature = "otel_spans")]
    {
        use tracing_subscriber::{fmt, EnvFilter};
        let _ = fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
        tracing::info!(target = "polysolve", app = APP_NAME, "tracing initialized");
    }
}

// ----------------------------------------------------------------------------
// Shared helpers
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct EventLine<'a, T: Serialize> {
    event: &'a str,
    data: T,
}

/// Write one `{"event", "data"}` JSON line. Failures are logged, never raised.
///
/// INVARIANT: emitted event names are dash-normalized.
pub fn emit_or_log<W: Write, T: Serialize>(out: &mut W, event: &str, data: T) {
    let evt = if event.contains('.') {
        event.replace('.', "-")
    } else {
        event.to_string()
    };
    let line = EventLine { event: &evt, data };
    let written = serde_json::to_writer(&mut *out, &line)
        .map_err(std::io::Error::from)
        .and_then(|()| out.write_all(b"\n"))
        .and_then(|()| out.flush());
    if let Err(err) = written {
        tracing::warn!(target = "polysolve", event = %evt, error = %err, "failed to emit event");
    }
}
