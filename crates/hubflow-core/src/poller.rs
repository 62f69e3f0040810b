// ── Discovery poller state machine ──
//
// Tracks bootstrap health across polling cycles. The async side (the
// bridge's poll task) drives it; all decisions about when to notify and
// when to log live here so they can be exercised without a runtime.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Every Nth failure in a streak (counting from the first) is logged.
const FAILURE_LOG_EVERY: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryPhase {
    #[default]
    Unstarted,
    Polling,
    Valid,
    Unreachable,
}

/// Bootstrap health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryState {
    pub phase: DiscoveryPhase,
    /// The catalog has been populated at least once.
    pub valid: bool,
    /// The last fetch succeeded.
    pub reachable: bool,
    /// Consecutive failed fetches.
    pub fail_count: u32,
    /// A global error notice was issued for the current failure streak.
    pub error_triggered: bool,
    /// A fetch is outstanding.
    pub refresh_in_progress: bool,
    pub last_polling: Option<DateTime<Utc>>,
}

/// What a successful fetch means for the rest of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessTransition {
    /// First time the catalog became valid: start the event stream and
    /// fan out start notices.
    pub first_valid: bool,
    /// A failure streak that had been reported has ended.
    pub recovered: bool,
}

/// What a failed fetch requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureReport {
    /// Issue a global error notice (once per streak).
    pub notify: bool,
    /// Log the failure (first of the streak, then every fourth).
    pub log: bool,
    pub reason: &'static str,
}

impl DiscoveryState {
    /// Claim the single in-flight refresh slot.
    ///
    /// Returns `false` when a fetch is already outstanding.
    pub fn begin_refresh(&mut self) -> bool {
        if self.refresh_in_progress {
            return false;
        }
        self.refresh_in_progress = true;
        if self.phase == DiscoveryPhase::Unstarted {
            self.phase = DiscoveryPhase::Polling;
        }
        true
    }

    pub fn complete_success(&mut self, now: DateTime<Utc>) -> SuccessTransition {
        let transition = SuccessTransition {
            first_valid: !self.valid,
            recovered: self.error_triggered,
        };
        self.phase = DiscoveryPhase::Valid;
        self.valid = true;
        self.reachable = true;
        self.fail_count = 0;
        self.error_triggered = false;
        self.refresh_in_progress = false;
        self.last_polling = Some(now);
        transition
    }

    pub fn complete_failure(&mut self) -> FailureReport {
        self.phase = DiscoveryPhase::Unreachable;
        self.reachable = false;
        self.refresh_in_progress = false;
        self.fail_count = self.fail_count.saturating_add(1);

        let notify = !self.error_triggered;
        self.error_triggered = true;

        FailureReport {
            notify,
            log: self.fail_count % FAILURE_LOG_EVERY == 1,
            reason: if self.valid {
                "cannot reach the gateway"
            } else {
                "cannot reach the gateway since startup, check the server configuration"
            },
        }
    }
}
