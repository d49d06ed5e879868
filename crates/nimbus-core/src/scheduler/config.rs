//! Compile-time scheduler constants and their default values.

use std::time::Duration;

/// Initial sleep between scheduling ticks when idle.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ceiling for the idle-backoff sleep.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum tasks pulled per `(priority, tick)` in [`super::Scheduler::tick`].
pub const BATCH: i64 = 20;

/// Default bound on globally in-flight tasks.
pub const DEFAULT_MAX_INFLIGHT: usize = 10;

/// Lease duration for a task lock (mirrors `nimbus_db::queries::tasks::lock_ttl`).
pub const LOCK_TTL: Duration = Duration::from_secs(300);

/// Heartbeat cadence: a third of the lease, so a held lock survives at
/// least two missed heartbeats before expiring.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(100);

/// Consecutive heartbeat failures before a task is abandoned as unrecoverable
/// from this process (the lock will expire and another scheduler will
/// recover it).
pub const MAX_HEARTBEAT_FAILURES: u32 = 3;

/// Hard ceiling on a single task's wall-clock execution time.
pub const MAX_TASK_RUNTIME: Duration = Duration::from_secs(3600);

/// Grace period to let in-flight tasks finish during shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Tunable scheduler configuration, defaulting to the constants above.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_inflight: usize,
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
    pub batch: i64,
    pub heartbeat_interval: Duration,
    pub max_heartbeat_failures: u32,
    pub max_task_runtime: Duration,
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            poll_interval: POLL_INTERVAL,
            max_poll_interval: MAX_POLL_INTERVAL,
            batch: BATCH,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            max_heartbeat_failures: MAX_HEARTBEAT_FAILURES,
            max_task_runtime: MAX_TASK_RUNTIME,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}
