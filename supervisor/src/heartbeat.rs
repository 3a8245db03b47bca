//! Heartbeat state machine
//!
//! Pure and synchronous: converts a stream of health-probe results into
//! restart and recovery decisions. The states are implicit in the failure
//! counter.

/// Outcome of a single heartbeat observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatVerdict {
    /// The failure threshold was reached; restart the process
    pub restart: bool,
    /// The process answered after a failure streak
    pub recovered: bool,
}

/// Consecutive-failure tracker for the supervised process
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    failure_threshold: u32,
    consecutive_failures: u32,
}

impl HeartbeatState {
    /// A threshold of 0 is coerced to 1 (restart on the first failure)
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Feed one probe result into the machine
    ///
    /// Reaching the threshold resets the counter: a restart starts a fresh
    /// window rather than a cooldown.
    pub fn observe(&mut self, healthy: bool) -> HeartbeatVerdict {
        if healthy {
            let recovered = self.consecutive_failures > 0;
            self.consecutive_failures = 0;
            return HeartbeatVerdict {
                restart: false,
                recovered,
            };
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_threshold {
            self.consecutive_failures = 0;
            return HeartbeatVerdict {
                restart: true,
                recovered: false,
            };
        }
        HeartbeatVerdict::default()
    }

    /// Forget any failure streak (called after every rebuild)
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}
