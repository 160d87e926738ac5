/*!
 * Executor Limits and Constants
 *
 * Defaults for the bounded executor, grouped by concern.
 */

use std::time::Duration;

// =============================================================================
// ESCALATION
// =============================================================================

/// Maximum wait per escalation phase (3s)
/// Applied after terminate and again after kill before declaring zombies
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Liveness poll interval while waiting for processes to exit (10ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Size of the little-endian length prefix on every frame
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest frame accepted on either side of the channel (64MB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// =============================================================================
// WORKER EXIT CODES
// =============================================================================

/// Worker wrote its envelope and exited normally
pub const EXIT_OK: i32 = 0;

/// Worker could not write its envelope to the channel
pub const EXIT_REPORT_FAILED: i32 = 70;

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Overrides the join timeout, in (fractional) seconds
pub const ENV_JOIN_TIMEOUT: &str = "BOUNDED_EXEC_JOIN_TIMEOUT";

/// Overrides the liveness poll interval, in milliseconds
pub const ENV_POLL_INTERVAL_MS: &str = "BOUNDED_EXEC_POLL_INTERVAL_MS";

/// Path of the worker binary used for exec launch
pub const ENV_WORKER: &str = "BOUNDED_EXEC_WORKER";

/// Backtrace capture mode: `env`, `always` or `never`
pub const ENV_BACKTRACE: &str = "BOUNDED_EXEC_BACKTRACE";

/// Enables JSON log output when `1` or `true`
pub const ENV_TRACE_JSON: &str = "BOUNDED_EXEC_TRACE_JSON";
