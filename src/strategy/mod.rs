//! Pair cycling strategy.
//!
//! Contains the core logic for:
//! - Sizing a pair from the balance and configured range
//! - Opening a long/short pair with rollback
//! - Closing every open position in parallel
//! - The cycle state machine driving it all

mod controller;
mod legs;
mod opener;
mod sizing;

pub use controller::{CycleController, CycleOutcome, CycleState, OpenGuard};
pub use legs::{close_all_positions, open_leg, CloseSummary};
pub use opener::{free_slots, OpenFailure, PairOpened, PositionOpener};
pub use sizing::{max_order_value, split_order_value, LegSizes};
