//! Exchange integrations for the pair cycler.
//!
//! ## Gateway
//! Signed REST access to the exchange gateway that owns transaction
//! construction and signing:
//! - Position open/close (submit and wait for receipt)
//! - Position, balance and allowance queries
//! - Market index resolution
//!
//! ## Paper
//! In-memory ledger with registration lag and fault injection, used for
//! paper trading and tests.

mod client;
pub mod mock;
mod traits;
mod types;

pub use client::GatewayClient;
pub use mock::{Fault, PaperCall, PaperExchangeClient};
#[cfg(test)]
pub use traits::MockExchangeClient;
pub use traits::{ExchangeClient, ExchangeError, ExchangeResult};
pub use types::*;
