//! Pull configuration constants

use std::time::Duration;

/// Maximum attempts per record before it is recorded as failed.
/// The legacy server drops sessions and connections for minutes at a time,
/// so one record may need many attempts before it is reachable again.
pub const MAX_ATTEMPTS: u32 = 60;

/// Delay before the first retry, in milliseconds.
pub const BASE_DELAY_MS: u64 = 1000; // 1 second

/// Multiplier applied to the delay on every further retry.
pub const BACKOFF_FACTOR: u32 = 2;

/// Upper bound on a single backoff delay, in milliseconds.
/// With 60 attempts most of the wait is spent at the cap (roughly one hour total).
pub const MAX_DELAY_MS: u64 = 60_000; // 60 seconds

/// Relative jitter applied to every backoff delay (0.25 = ±25%).
pub const JITTER: f64 = 0.25;

/// Default number of identifiers per chunk.
pub const DEFAULT_CHUNK_SIZE: u64 = 500;

/// Default number of chunks pulled concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Hard ceiling on concurrent workers; each holds its own database connection.
pub const MAX_WORKERS_LIMIT: usize = 64;

/// Default interval between monitor snapshots.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);
