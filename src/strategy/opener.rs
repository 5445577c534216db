//! Paired open protocol.
//!
//! Establishes exactly one long and one short on a market, or leaves the
//! account flat. Legs are submitted one after another: both consume the
//! signer's transaction sequence, so a concurrent submit would collide.
//! A fixed settle delay between them is the only mitigation.

use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::legs::{close_all_positions, leg_order, open_leg};
use super::sizing::LegSizes;
use crate::config::TimingConfig;
use crate::exchange::{Account, Direction, ExchangeClient, ExchangeError, Position, TxReceipt};
use crate::risk::wait_for_positions_registered;
use rust_decimal::Decimal;

/// Why a pair could not be established. Every variant counts as a failed
/// open attempt.
#[derive(Debug, Error)]
pub enum OpenFailure {
    #[error("{0} positions already open")]
    PositionsExist(usize),

    #[error("could not read open positions: {0}")]
    Query(#[source] ExchangeError),

    #[error("allowance update failed: {0}")]
    Allowance(#[source] ExchangeError),

    #[error("long leg failed: {0}")]
    LongLeg(#[source] ExchangeError),

    #[error("short leg failed after long confirmed: {0}")]
    ShortLeg(#[source] ExchangeError),

    #[error("positions not registered within {0}s")]
    NotRegistered(u64),
}

/// A confirmed and registered pair.
#[derive(Debug, Clone)]
pub struct PairOpened {
    pub pair_index: u32,
    pub long_index: u32,
    pub short_index: u32,
    pub long_tx: TxReceipt,
    pub short_tx: TxReceipt,
}

/// Lowest two trade slot indices not used by `positions`.
pub fn free_slots(positions: &[Position]) -> (u32, u32) {
    let used = |slot: u32| positions.iter().any(|p| p.trade_index == slot);

    let mut first = 0;
    while used(first) {
        first += 1;
    }
    let mut second = first + 1;
    while used(second) {
        second += 1;
    }
    (first, second)
}

pub struct PositionOpener {
    client: Arc<dyn ExchangeClient>,
    account: Account,
    leverage: u32,
    allowance_multiplier: Decimal,
    timing: TimingConfig,
}

impl PositionOpener {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        account: Account,
        leverage: u32,
        allowance_multiplier: Decimal,
        timing: TimingConfig,
    ) -> Self {
        Self {
            client,
            account,
            leverage,
            allowance_multiplier,
            timing,
        }
    }

    /// Open a long and a short of the given sizes on `pair_index`.
    ///
    /// On any failure after the long leg confirms, everything is closed
    /// before returning.
    pub async fn open_pair(&self, pair_index: u32, legs: LegSizes) -> Result<PairOpened, OpenFailure> {
        let client = self.client.as_ref();
        let account = &self.account;

        let existing = client
            .list_open_positions(account)
            .await
            .map_err(OpenFailure::Query)?;
        if !existing.is_empty() {
            for position in &existing {
                error!(
                    account = %account.prefix(),
                    direction = %position.direction,
                    trade_index = position.trade_index,
                    "Position already open before pair open"
                );
            }
            return Err(OpenFailure::PositionsExist(existing.len()));
        }

        let (long_index, short_index) = free_slots(&existing);
        info!(long_index, short_index, "Trade slots selected");

        self.ensure_allowance(legs.total()).await?;

        info!(
            account = %account.prefix(),
            pair_index,
            long = %legs.long,
            short = %legs.short,
            leverage = self.leverage,
            "Opening delta-neutral pair"
        );

        let long_order = leg_order(pair_index, Direction::Long, legs.long, self.leverage, long_index);
        let long_tx = open_leg(client, account, &long_order)
            .await
            .map_err(OpenFailure::LongLeg)?;

        sleep(self.timing.leg_settle()).await;

        let short_order = leg_order(pair_index, Direction::Short, legs.short, self.leverage, short_index);
        let short_tx = match open_leg(client, account, &short_order).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Short leg failed - rolling back long leg");
                self.rollback().await;
                return Err(OpenFailure::ShortLeg(e));
            }
        };

        let registered = wait_for_positions_registered(
            client,
            account,
            2,
            self.timing.registration_max_wait(),
            self.timing.registration_poll(),
        )
        .await;

        if !registered {
            warn!("Pair confirmed but not registered - rolling back");
            self.rollback().await;
            return Err(OpenFailure::NotRegistered(self.timing.registration_max_wait_secs));
        }

        info!(
            account = %account.prefix(),
            pair_index,
            long_tx = %long_tx.short_hash(),
            short_tx = %short_tx.short_hash(),
            "Delta-neutral pair confirmed and registered"
        );

        Ok(PairOpened {
            pair_index,
            long_index,
            short_index,
            long_tx,
            short_tx,
        })
    }

    /// Raise the allowance to a multiple of `total` if it does not cover it.
    async fn ensure_allowance(&self, total: Decimal) -> Result<(), OpenFailure> {
        let current = self
            .client
            .get_allowance(&self.account)
            .await
            .map_err(OpenFailure::Allowance)?;

        if current >= total {
            return Ok(());
        }

        let amount = total * self.allowance_multiplier;
        info!(%current, %total, %amount, "Allowance too low - approving");

        let receipt = self
            .client
            .set_allowance(&self.account, amount)
            .await
            .map_err(OpenFailure::Allowance)?;
        info!(tx = %receipt.short_hash(), "Allowance approved");

        // approval consumes a sequence number too
        sleep(self.timing.allowance_settle()).await;
        Ok(())
    }

    async fn rollback(&self) {
        sleep(self.timing.rollback_delay()).await;

        match close_all_positions(self.client.as_ref(), &self.account).await {
            Ok(summary) if summary.is_complete() => {
                info!(closed = summary.closed, "Rollback complete");
            }
            Ok(summary) => {
                error!(
                    closed = summary.closed,
                    failed = summary.failed(),
                    "Rollback incomplete - positions may remain open"
                );
            }
            Err(e) => {
                error!(error = %e, "Rollback failed - positions may remain open");
            }
        }
    }
}
