//! # Delta Pair Cycler
//!
//! Repeatedly opens a matched long/short pair of leveraged perpetual
//! positions on one market, holds it for a randomized duration, closes it,
//! and starts over. At every observation point the account holds either
//! nothing or exactly one long and one short.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading, validation, timing constants, market list
//! - `exchange`: Exchange facade, signed gateway client, paper ledger
//! - `strategy`: Sizing, paired open protocol, cycle controller
//! - `risk`: Pair invariant, failure breaker, reconciliation waiter, watchdog
//! - `persistence`: JSON status record

pub mod config;
pub mod exchange;
pub mod persistence;
pub mod risk;
pub mod strategy;

pub use config::Config;
