//! Consecutive-failure breaker for the open protocol.
//!
//! Counts failed open attempts in a row. Reaching the ceiling halts the
//! trading loop until an operator restarts it; a verified pair resets the
//! count. Trips are emitted as structured `RISK_ALERT` records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, warn};

/// Severity levels for alerts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Warning,
    Error,
    Critical,
}

/// What a risk alert is about.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RiskAlertKind {
    /// Open attempt failed, breaker still armed
    OpenFailure { consecutive_failures: u32, ceiling: u32 },
    /// Ceiling reached, trading halted
    BreakerTripped { consecutive_failures: u32 },
    /// Pair invariant broken after open or during holding
    InvariantViolation { long: usize, short: usize, stage: String },
}

/// A risk alert, emitted as one JSON log line.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAlert {
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub kind: RiskAlertKind,
    pub severity: AlertSeverity,
    pub message: String,
}

impl RiskAlert {
    pub fn new(account: &str, kind: RiskAlertKind, severity: AlertSeverity, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            account: account.to_string(),
            kind,
            severity,
            message,
        }
    }

    /// Emit alert as structured log.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();

        match self.severity {
            AlertSeverity::Warning => warn!(target: "risk_alert", "RISK_ALERT: {}", json),
            AlertSeverity::Error | AlertSeverity::Critical => {
                error!(target: "risk_alert", "RISK_ALERT: {}", json)
            }
        }
    }
}

/// Breaker state after recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Armed { failures: u32 },
    Tripped { failures: u32 },
}

/// Lock-free consecutive-failure counter.
#[derive(Debug)]
pub struct FailureBreaker {
    failures: AtomicU32,
    ceiling: u32,
}

impl FailureBreaker {
    pub fn new(ceiling: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            ceiling: ceiling.max(1),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn is_tripped(&self) -> bool {
        self.failures() >= self.ceiling
    }

    /// Record a failed open attempt for `account`.
    pub fn record_failure(&self, account: &str) -> BreakerState {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;

        if failures >= self.ceiling {
            RiskAlert::new(
                account,
                RiskAlertKind::BreakerTripped {
                    consecutive_failures: failures,
                },
                AlertSeverity::Critical,
                format!(
                    "{} consecutive open failures - halting. Check collateral balance, orphaned positions and the errors above",
                    failures
                ),
            )
            .emit();
            return BreakerState::Tripped { failures };
        }

        RiskAlert::new(
            account,
            RiskAlertKind::OpenFailure {
                consecutive_failures: failures,
                ceiling: self.ceiling,
            },
            AlertSeverity::Error,
            format!("Open failure {}/{}", failures, self.ceiling),
        )
        .emit();
        BreakerState::Armed { failures }
    }

    /// Record a verified pair; resets the count.
    pub fn record_success(&self) {
        let previous = self.failures.swap(0, Ordering::AcqRel);
        if previous > 0 {
            debug!(previous_failures = previous, "Pair verified - resetting failure counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_at_ceiling() {
        let breaker = FailureBreaker::new(3);

        assert_eq!(breaker.record_failure("0xabc"), BreakerState::Armed { failures: 1 });
        assert_eq!(breaker.record_failure("0xabc"), BreakerState::Armed { failures: 2 });
        assert!(!breaker.is_tripped());
        assert_eq!(breaker.record_failure("0xabc"), BreakerState::Tripped { failures: 3 });
        assert!(breaker.is_tripped());
    }

    #[test]
    fn test_success_between_failures_resets() {
        let breaker = FailureBreaker::new(3);

        breaker.record_failure("0xabc");
        breaker.record_failure("0xabc");
        breaker.record_success();
        assert_eq!(breaker.failures(), 0);

        assert_eq!(breaker.record_failure("0xabc"), BreakerState::Armed { failures: 1 });
    }

    #[test]
    fn test_zero_ceiling_clamped() {
        let breaker = FailureBreaker::new(0);
        assert_eq!(breaker.ceiling(), 1);
        assert_eq!(breaker.record_failure("0xabc"), BreakerState::Tripped { failures: 1 });
    }

    #[test]
    fn test_alert_serializes_kind_tag() {
        let alert = RiskAlert::new(
            "0xabc",
            RiskAlertKind::InvariantViolation {
                long: 2,
                short: 0,
                stage: "verify".to_string(),
            },
            AlertSeverity::Error,
            "broken".to_string(),
        );
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"]["type"], "InvariantViolation");
        assert_eq!(json["kind"]["long"], 2);
    }
}
