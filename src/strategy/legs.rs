//! Single-leg execution and full liquidation.

use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::exchange::{
    Account, CloseOrder, Direction, ExchangeClient, ExchangeError, OpenOrder, TxReceipt,
};

/// Result of a close-all fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSummary {
    pub attempted: usize,
    pub closed: usize,
}

impl CloseSummary {
    pub fn failed(&self) -> usize {
        self.attempted - self.closed
    }

    pub fn is_complete(&self) -> bool {
        self.closed == self.attempted
    }
}

/// Open one leg of a pair. Failures are logged with full order context.
pub async fn open_leg(
    client: &dyn ExchangeClient,
    account: &Account,
    order: &OpenOrder,
) -> Result<TxReceipt, ExchangeError> {
    match client.open_position(account, order).await {
        Ok(receipt) => {
            info!(
                account = %account.prefix(),
                direction = %order.direction,
                collateral = %order.collateral,
                leverage = order.leverage,
                trade_index = order.trade_index,
                tx = %receipt.short_hash(),
                "Leg opened"
            );
            Ok(receipt)
        }
        Err(e) => {
            error!(
                account = %account.prefix(),
                direction = %order.direction,
                pair_index = order.pair_index,
                collateral = %order.collateral,
                leverage = order.leverage,
                trade_index = order.trade_index,
                error = %e,
                "Leg open failed"
            );
            Err(e)
        }
    }
}

/// Build the open order for one leg.
pub fn leg_order(
    pair_index: u32,
    direction: Direction,
    collateral: Decimal,
    leverage: u32,
    trade_index: u32,
) -> OpenOrder {
    OpenOrder {
        pair_index,
        collateral,
        direction,
        leverage,
        trade_index,
    }
}

/// Close every open position of `account` in parallel.
///
/// Each close is independent; a failed close is logged and counted, never
/// retried here. Fails only if the position list cannot be read.
pub async fn close_all_positions(
    client: &dyn ExchangeClient,
    account: &Account,
) -> Result<CloseSummary, ExchangeError> {
    let positions = client.list_open_positions(account).await.map_err(|e| {
        error!(account = %account.prefix(), error = %e, "Cannot list positions to close");
        e
    })?;

    if positions.is_empty() {
        info!(account = %account.prefix(), "No open positions to close");
        return Ok(CloseSummary::default());
    }

    info!(account = %account.prefix(), count = positions.len(), "Closing all positions");

    let orders: Vec<CloseOrder> = positions.iter().map(CloseOrder::from).collect();
    let results = join_all(orders.iter().map(|order| client.close_position(account, order))).await;

    let mut closed = 0;
    for (order, result) in orders.iter().zip(results) {
        match result {
            Ok(receipt) => {
                closed += 1;
                info!(
                    account = %account.prefix(),
                    pair_index = order.pair_index,
                    trade_index = order.trade_index,
                    tx = %receipt.short_hash(),
                    "Position closed"
                );
            }
            Err(e) => {
                error!(
                    account = %account.prefix(),
                    pair_index = order.pair_index,
                    trade_index = order.trade_index,
                    collateral = %order.collateral,
                    error = %e,
                    "Failed to close position"
                );
            }
        }
    }

    let summary = CloseSummary {
        attempted: orders.len(),
        closed,
    };
    if summary.is_complete() {
        info!(closed, "All positions closed");
    } else {
        warn!(closed, failed = summary.failed(), "Some positions failed to close");
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Fault, PaperCall, PaperExchangeClient};
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::new("0x1234567890abcdef")
    }

    #[tokio::test]
    async fn test_close_all_on_empty_ledger_is_noop() {
        let client = PaperExchangeClient::new(dec!(100));

        let summary = close_all_positions(&client, &account()).await.unwrap();

        assert_eq!(summary, CloseSummary { attempted: 0, closed: 0 });
        assert_eq!(client.calls().await, vec![PaperCall::ListPositions]);
    }

    #[tokio::test]
    async fn test_close_all_counts_partial_failure() {
        let client = PaperExchangeClient::new(dec!(1000));
        client.seed_position(0, 0, Direction::Long, dec!(20)).await;
        client.seed_position(0, 1, Direction::Short, dec!(20)).await;
        client.inject(Fault::RejectClose).await;

        let summary = close_all_positions(&client, &account()).await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.closed, 1);
        assert!(!summary.is_complete());
        assert_eq!(client.ledger_positions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_close_all_propagates_query_failure() {
        let client = PaperExchangeClient::new(dec!(1000));
        client.seed_position(0, 0, Direction::Long, dec!(20)).await;
        client.inject(Fault::FailQuery).await;

        assert!(close_all_positions(&client, &account()).await.is_err());
        assert_eq!(client.ledger_positions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_open_leg_passes_rejection_through() {
        let client = PaperExchangeClient::new(dec!(1000)).with_allowance(dec!(1000));
        client.inject(Fault::RejectOpen(Direction::Short)).await;

        let order = leg_order(0, Direction::Short, dec!(25), 10, 1);
        let err = open_leg(&client, &account(), &order).await.unwrap_err();

        assert!(matches!(err, ExchangeError::Rejected(_)));
    }
}
