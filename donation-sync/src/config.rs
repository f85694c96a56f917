//! Delivery tuning.

use std::time::Duration;

/// Default bound of each subscriber's outbound queue (frames).
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Default number of undelivered donations tolerated while paused.
pub const DEFAULT_MAX_BACKLOG: u64 = 1024;

/// Per-subscription delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Capacity used by [`ConnectionHandle::pair`](crate::ConnectionHandle::pair)
    /// when the engine creates connections itself.
    pub outbound_capacity: usize,
    /// Undelivered donations tolerated while delivery is paused.
    pub max_backlog: u64,
    /// Longest a pause may last before the subscription detaches.
    pub max_pause: Duration,
    /// Interval between `Heartbeat` frames.
    pub heartbeat_interval: Duration,
    /// Inbound silence after which delivery pauses.
    pub liveness_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_backlog: DEFAULT_MAX_BACKLOG,
            max_pause: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(15),
            liveness_timeout: Duration::from_secs(45),
        }
    }
}

impl SyncConfig {
    pub fn with_max_backlog(mut self, max_backlog: u64) -> Self {
        self.max_backlog = max_backlog;
        self
    }

    pub fn with_max_pause(mut self, max_pause: Duration) -> Self {
        self.max_pause = max_pause;
        self
    }

    /// Set heartbeat and liveness together; liveness is clamped to at least
    /// one heartbeat interval.
    pub fn with_heartbeat(mut self, interval: Duration, liveness_timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.liveness_timeout = liveness_timeout.max(interval);
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }
}
