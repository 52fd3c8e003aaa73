//! Debounce and request timeout configuration

/// Debounce window applied to coefficient edits before a format preview is requested.
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;

/// Per-request timeouts. `solve` is the only request kind expected to run long.
pub const DEFAULT_FORMAT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CALC_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SOLVE_TIMEOUT_MS: u64 = 120_000;

/// Simulated warm-up of the built-in numeric runtime.
pub const DEFAULT_BOOT_DELAY_MS: u64 = 0;
