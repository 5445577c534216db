//! Settlement and polling delays.
//!
//! The settlement delays are a mitigation, not a guarantee: a submitted
//! transaction is assumed visible to the next request after a fixed wait.
//! Nothing confirms the wait was long enough except re-querying afterwards,
//! so these are a known source of flakiness on slow ledger backends.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait after force-closing stray positions before re-checking.
pub const STRAY_SETTLE_DELAY_SECS: u64 = 5;
/// Wait after an allowance transaction before submitting opens.
pub const ALLOWANCE_SETTLE_DELAY_SECS: u64 = 3;
/// Wait between the long and short leg for the signer's sequence counter.
pub const LEG_SETTLE_DELAY_SECS: u64 = 3;
/// Wait before rolling back a half-open or unregistered pair.
pub const ROLLBACK_DELAY_SECS: u64 = 5;
/// Poll interval of the registration waiter.
pub const REGISTRATION_POLL_SECS: u64 = 2;
/// Upper bound on the registration wait after both legs confirm.
pub const REGISTRATION_MAX_WAIT_SECS: u64 = 20;
/// Grace period before verifying a freshly opened pair.
pub const VERIFY_GRACE_DELAY_SECS: u64 = 2;
/// Wait after liquidating a pair that failed verification.
pub const VERIFY_FAILURE_DELAY_SECS: u64 = 5;
/// Watchdog poll interval during the holding period.
pub const WATCHDOG_POLL_SECS: u64 = 5;
/// Minimum spacing of watchdog status lines.
pub const WATCHDOG_LOG_SECS: u64 = 30;
/// Wait before retrying a cycle that could not select or size a market.
pub const RETRY_LATER_DELAY_SECS: u64 = 60;
/// Wait when the open gate reports positions already open.
pub const GATE_BUSY_DELAY_SECS: u64 = 30;

/// Timing configuration; every field defaults to its named constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_stray_settle")]
    pub stray_settle_secs: u64,
    #[serde(default = "default_allowance_settle")]
    pub allowance_settle_secs: u64,
    #[serde(default = "default_leg_settle")]
    pub leg_settle_secs: u64,
    #[serde(default = "default_rollback_delay")]
    pub rollback_delay_secs: u64,
    #[serde(default = "default_registration_poll")]
    pub registration_poll_secs: u64,
    #[serde(default = "default_registration_max_wait")]
    pub registration_max_wait_secs: u64,
    #[serde(default = "default_verify_grace")]
    pub verify_grace_secs: u64,
    #[serde(default = "default_verify_failure_delay")]
    pub verify_failure_delay_secs: u64,
    #[serde(default = "default_watchdog_poll")]
    pub watchdog_poll_secs: u64,
    #[serde(default = "default_watchdog_log")]
    pub watchdog_log_secs: u64,
    #[serde(default = "default_retry_later")]
    pub retry_later_secs: u64,
    #[serde(default = "default_gate_busy")]
    pub gate_busy_secs: u64,
}

fn default_stray_settle() -> u64 {
    STRAY_SETTLE_DELAY_SECS
}

fn default_allowance_settle() -> u64 {
    ALLOWANCE_SETTLE_DELAY_SECS
}

fn default_leg_settle() -> u64 {
    LEG_SETTLE_DELAY_SECS
}

fn default_rollback_delay() -> u64 {
    ROLLBACK_DELAY_SECS
}

fn default_registration_poll() -> u64 {
    REGISTRATION_POLL_SECS
}

fn default_registration_max_wait() -> u64 {
    REGISTRATION_MAX_WAIT_SECS
}

fn default_verify_grace() -> u64 {
    VERIFY_GRACE_DELAY_SECS
}

fn default_verify_failure_delay() -> u64 {
    VERIFY_FAILURE_DELAY_SECS
}

fn default_watchdog_poll() -> u64 {
    WATCHDOG_POLL_SECS
}

fn default_watchdog_log() -> u64 {
    WATCHDOG_LOG_SECS
}

fn default_retry_later() -> u64 {
    RETRY_LATER_DELAY_SECS
}

fn default_gate_busy() -> u64 {
    GATE_BUSY_DELAY_SECS
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stray_settle_secs: default_stray_settle(),
            allowance_settle_secs: default_allowance_settle(),
            leg_settle_secs: default_leg_settle(),
            rollback_delay_secs: default_rollback_delay(),
            registration_poll_secs: default_registration_poll(),
            registration_max_wait_secs: default_registration_max_wait(),
            verify_grace_secs: default_verify_grace(),
            verify_failure_delay_secs: default_verify_failure_delay(),
            watchdog_poll_secs: default_watchdog_poll(),
            watchdog_log_secs: default_watchdog_log(),
            retry_later_secs: default_retry_later(),
            gate_busy_secs: default_gate_busy(),
        }
    }
}

impl TimingConfig {
    pub fn stray_settle(&self) -> Duration {
        Duration::from_secs(self.stray_settle_secs)
    }

    pub fn allowance_settle(&self) -> Duration {
        Duration::from_secs(self.allowance_settle_secs)
    }

    pub fn leg_settle(&self) -> Duration {
        Duration::from_secs(self.leg_settle_secs)
    }

    pub fn rollback_delay(&self) -> Duration {
        Duration::from_secs(self.rollback_delay_secs)
    }

    pub fn registration_poll(&self) -> Duration {
        Duration::from_secs(self.registration_poll_secs)
    }

    pub fn registration_max_wait(&self) -> Duration {
        Duration::from_secs(self.registration_max_wait_secs)
    }

    pub fn verify_grace(&self) -> Duration {
        Duration::from_secs(self.verify_grace_secs)
    }

    pub fn verify_failure_delay(&self) -> Duration {
        Duration::from_secs(self.verify_failure_delay_secs)
    }

    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_secs(self.watchdog_poll_secs)
    }

    pub fn watchdog_log(&self) -> Duration {
        Duration::from_secs(self.watchdog_log_secs)
    }

    pub fn retry_later(&self) -> Duration {
        Duration::from_secs(self.retry_later_secs)
    }

    pub fn gate_busy(&self) -> Duration {
        Duration::from_secs(self.gate_busy_secs)
    }
}
