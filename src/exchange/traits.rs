//! Venue-agnostic exchange facade.
//!
//! Everything the lifecycle controller knows about the ledger comes through
//! [`ExchangeClient`]. Implementations own transaction construction, signing,
//! submission and confirmation; callers only see receipts and projections.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{Account, CloseOrder, OpenOrder, Position, TxReceipt};

/// Errors surfaced by an exchange client.
///
/// A failed position query is an error, never an empty list: "no positions"
/// and "could not read positions" must stay distinguishable.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("gateway returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("transaction {tx_hash} reverted (status {status})")]
    Reverted { tx_hash: String, status: u8 },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExchangeError::Decode(err.to_string())
        } else {
            ExchangeError::Transport(err.to_string())
        }
    }
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Facade over a leveraged-perpetuals venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit and confirm a market open. Returns the receipt on status 1.
    async fn open_position(&self, account: &Account, order: &OpenOrder)
        -> ExchangeResult<TxReceipt>;

    /// Submit and confirm a full close of one position.
    async fn close_position(
        &self,
        account: &Account,
        order: &CloseOrder,
    ) -> ExchangeResult<TxReceipt>;

    /// Open positions currently visible for the account.
    async fn list_open_positions(&self, account: &Account) -> ExchangeResult<Vec<Position>>;

    /// Collateral token balance of the account.
    async fn get_balance(&self, account: &Account) -> ExchangeResult<Decimal>;

    /// Resolve a symbol (e.g. "ETH/USD") to the venue's pair index.
    async fn resolve_market_index(&self, symbol: &str) -> ExchangeResult<Option<u32>>;

    /// Amount the trading contract may currently pull from the account.
    async fn get_allowance(&self, account: &Account) -> ExchangeResult<Decimal>;

    /// Raise the trading allowance. Consumes a transaction sequence slot.
    async fn set_allowance(&self, account: &Account, amount: Decimal)
        -> ExchangeResult<TxReceipt>;
}
