//! Risk controls for the pair lifecycle.
//!
//! - Pair invariant classification (empty or one long + one short)
//! - Consecutive-failure breaker with structured alerts
//! - Post-open reconciliation waiter
//! - Holding-period watchdog

mod breaker;
pub(crate) mod invariant;
mod reconcile;
mod watchdog;

pub use breaker::{AlertSeverity, BreakerState, FailureBreaker, RiskAlert, RiskAlertKind};
pub use invariant::{PairAnomaly, PairShape};
pub use reconcile::wait_for_positions_registered;
pub use watchdog::Watchdog;
