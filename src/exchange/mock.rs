//! Paper trading exchange: an in-memory ledger behind the exchange facade.
//!
//! Simulates the behaviour the lifecycle controller has to survive:
//! registration lag between confirmation and visibility, rejected
//! transactions and failed queries (injected as [`Fault`]s).

use super::traits::{ExchangeClient, ExchangeError, ExchangeResult};
use super::types::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

/// Fault injected into the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Next open of this direction is rejected
    RejectOpen(Direction),
    /// Next close is rejected
    RejectClose,
    /// Next position query fails
    FailQuery,
}

/// Facade call recorded by the paper exchange, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PaperCall {
    Open {
        direction: Direction,
        trade_index: u32,
        collateral: Decimal,
    },
    Close {
        trade_index: u32,
    },
    ListPositions,
    GetBalance,
    ResolveMarket(String),
    GetAllowance,
    SetAllowance(Decimal),
}

#[derive(Debug, Clone)]
struct PaperPosition {
    position: Position,
    visible_at: Instant,
}

/// Mutable ledger state.
#[derive(Debug)]
struct PaperLedger {
    balance: Decimal,
    allowance: Decimal,
    /// Keyed by trade slot; slots are unique per account across pairs
    positions: BTreeMap<u32, PaperPosition>,
    faults: VecDeque<Fault>,
    calls: Vec<PaperCall>,
}

/// Paper exchange client.
pub struct PaperExchangeClient {
    ledger: RwLock<PaperLedger>,
    markets: HashMap<String, u32>,
    /// Delay before a confirmed open becomes visible to queries
    registration_lag: Duration,
    /// Simulated mark price for every market
    mark_price: Decimal,
    tx_counter: AtomicU64,
}

impl PaperExchangeClient {
    /// Create a paper exchange with a balance and no allowance.
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            ledger: RwLock::new(PaperLedger {
                balance: initial_balance,
                allowance: Decimal::ZERO,
                positions: BTreeMap::new(),
                faults: VecDeque::new(),
                calls: Vec::new(),
            }),
            markets: HashMap::new(),
            registration_lag: Duration::ZERO,
            mark_price: dec!(1000),
            tx_counter: AtomicU64::new(1),
        }
    }

    /// Register tradable markets; indices follow the iteration order.
    pub fn with_markets<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for symbol in symbols {
            let index = self.markets.len() as u32;
            self.markets.insert(symbol.into(), index);
        }
        self
    }

    pub fn with_registration_lag(mut self, lag: Duration) -> Self {
        self.registration_lag = lag;
        self
    }

    pub fn with_allowance(mut self, allowance: Decimal) -> Self {
        self.ledger.get_mut().allowance = allowance;
        self
    }

    /// Queue a fault for the next matching call.
    pub async fn inject(&self, fault: Fault) {
        self.ledger.write().await.faults.push_back(fault);
    }

    /// Place a position directly on the ledger (e.g. a straggler from a crash).
    pub async fn seed_position(&self, pair_index: u32, trade_index: u32, direction: Direction, collateral: Decimal) {
        let mut ledger = self.ledger.write().await;
        let position = self.build_position(pair_index, trade_index, direction, collateral, Decimal::ONE);
        ledger.positions.insert(
            trade_index,
            PaperPosition {
                position,
                visible_at: Instant::now(),
            },
        );
    }

    /// Remove a position without a close call, as a liquidation would.
    pub async fn liquidate(&self, trade_index: u32) -> bool {
        self.ledger
            .write()
            .await
            .positions
            .remove(&trade_index)
            .is_some()
    }

    /// Every facade call made so far.
    pub async fn calls(&self) -> Vec<PaperCall> {
        self.ledger.read().await.calls.clone()
    }

    /// Positions regardless of registration lag.
    pub async fn ledger_positions(&self) -> Vec<Position> {
        self.ledger
            .read()
            .await
            .positions
            .values()
            .map(|p| p.position.clone())
            .collect()
    }

    pub async fn allowance(&self) -> Decimal {
        self.ledger.read().await.allowance
    }

    fn next_tx(&self) -> TxReceipt {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        TxReceipt {
            status: 1,
            transaction_hash: format!("0x{:064x}", n),
        }
    }

    fn build_position(
        &self,
        pair_index: u32,
        trade_index: u32,
        direction: Direction,
        collateral: Decimal,
        leverage: Decimal,
    ) -> Position {
        let price = self.mark_price;
        let liquidation_distance = if leverage > Decimal::ZERO {
            price * dec!(0.9) / leverage
        } else {
            price
        };
        let liquidation_price = match direction {
            Direction::Long => price - liquidation_distance,
            Direction::Short => price + liquidation_distance,
        };

        Position {
            pair_index,
            trade_index,
            collateral,
            direction,
            leverage,
            open_price: price,
            take_profit: None,
            stop_loss: None,
            liquidation_price,
            margin_fee: Decimal::ZERO,
        }
    }
}

impl PaperLedger {
    fn take_fault(&mut self, wanted: impl Fn(&Fault) -> bool) -> bool {
        match self.faults.iter().position(wanted) {
            Some(idx) => {
                self.faults.remove(idx);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchangeClient {
    async fn open_position(&self, account: &Account, order: &OpenOrder) -> ExchangeResult<TxReceipt> {
        let mut ledger = self.ledger.write().await;
        ledger.calls.push(PaperCall::Open {
            direction: order.direction,
            trade_index: order.trade_index,
            collateral: order.collateral,
        });

        if ledger.take_fault(|f| *f == Fault::RejectOpen(order.direction)) {
            return Err(ExchangeError::Rejected(format!(
                "paper {} open rejected",
                order.direction
            )));
        }
        if ledger.positions.contains_key(&order.trade_index) {
            return Err(ExchangeError::Rejected(format!(
                "trade index {} already in use",
                order.trade_index
            )));
        }
        if order.collateral > ledger.allowance {
            return Err(ExchangeError::Rejected("allowance too low".to_string()));
        }
        if order.collateral > ledger.balance {
            return Err(ExchangeError::Rejected("insufficient balance".to_string()));
        }

        ledger.balance -= order.collateral;
        ledger.allowance -= order.collateral;

        let position = self.build_position(
            order.pair_index,
            order.trade_index,
            order.direction,
            order.collateral,
            Decimal::from(order.leverage),
        );
        ledger.positions.insert(
            order.trade_index,
            PaperPosition {
                position,
                visible_at: Instant::now() + self.registration_lag,
            },
        );

        let receipt = self.next_tx();
        info!(
            trader = %account.prefix(),
            pair_index = order.pair_index,
            trade_index = order.trade_index,
            direction = %order.direction,
            collateral = %order.collateral,
            tx = %receipt.short_hash(),
            "Paper position opened"
        );
        Ok(receipt)
    }

    async fn close_position(&self, account: &Account, order: &CloseOrder) -> ExchangeResult<TxReceipt> {
        let mut ledger = self.ledger.write().await;
        ledger.calls.push(PaperCall::Close {
            trade_index: order.trade_index,
        });

        if ledger.take_fault(|f| *f == Fault::RejectClose) {
            return Err(ExchangeError::Rejected("paper close rejected".to_string()));
        }

        let removed = ledger
            .positions
            .remove(&order.trade_index)
            .ok_or_else(|| {
                ExchangeError::Rejected(format!("no open trade at index {}", order.trade_index))
            })?;

        ledger.balance += removed.position.collateral;

        let receipt = self.next_tx();
        debug!(
            trader = %account.prefix(),
            trade_index = order.trade_index,
            tx = %receipt.short_hash(),
            "Paper position closed"
        );
        Ok(receipt)
    }

    async fn list_open_positions(&self, _account: &Account) -> ExchangeResult<Vec<Position>> {
        let mut ledger = self.ledger.write().await;
        ledger.calls.push(PaperCall::ListPositions);

        if ledger.take_fault(|f| *f == Fault::FailQuery) {
            return Err(ExchangeError::Unavailable("paper query failure".to_string()));
        }

        let now = Instant::now();
        Ok(ledger
            .positions
            .values()
            .filter(|p| p.visible_at <= now)
            .map(|p| p.position.clone())
            .collect())
    }

    async fn get_balance(&self, _account: &Account) -> ExchangeResult<Decimal> {
        let mut ledger = self.ledger.write().await;
        ledger.calls.push(PaperCall::GetBalance);
        Ok(ledger.balance)
    }

    async fn resolve_market_index(&self, symbol: &str) -> ExchangeResult<Option<u32>> {
        self.ledger
            .write()
            .await
            .calls
            .push(PaperCall::ResolveMarket(symbol.to_string()));
        Ok(self.markets.get(symbol).copied())
    }

    async fn get_allowance(&self, _account: &Account) -> ExchangeResult<Decimal> {
        let mut ledger = self.ledger.write().await;
        ledger.calls.push(PaperCall::GetAllowance);
        Ok(ledger.allowance)
    }

    async fn set_allowance(&self, _account: &Account, amount: Decimal) -> ExchangeResult<TxReceipt> {
        let mut ledger = self.ledger.write().await;
        ledger.calls.push(PaperCall::SetAllowance(amount));
        ledger.allowance = amount;
        Ok(self.next_tx())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new("0xpaper000000000000")
    }

    fn order(direction: Direction, trade_index: u32, collateral: Decimal) -> OpenOrder {
        OpenOrder {
            pair_index: 0,
            collateral,
            direction,
            leverage: 10,
            trade_index,
        }
    }

    #[tokio::test]
    async fn test_open_and_close_round_trip_balance() {
        let client = PaperExchangeClient::new(dec!(1000))
            .with_markets(["ETH/USD"])
            .with_allowance(dec!(1000));

        client
            .open_position(&account(), &order(Direction::Long, 0, dec!(100)))
            .await
            .unwrap();
        assert_eq!(client.get_balance(&account()).await.unwrap(), dec!(900));

        let positions = client.list_open_positions(&account()).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert!(positions[0].liquidation_price < positions[0].open_price);

        client
            .close_position(&account(), &CloseOrder::from(&positions[0]))
            .await
            .unwrap();
        assert_eq!(client.get_balance(&account()).await.unwrap(), dec!(1000));
        assert!(client.list_open_positions(&account()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_requires_allowance() {
        let client = PaperExchangeClient::new(dec!(1000));

        let result = client
            .open_position(&account(), &order(Direction::Long, 0, dec!(100)))
            .await;
        assert!(matches!(result, Err(ExchangeError::Rejected(_))));

        client.set_allowance(&account(), dec!(300)).await.unwrap();
        assert!(client
            .open_position(&account(), &order(Direction::Long, 0, dec!(100)))
            .await
            .is_ok());
        assert_eq!(client.allowance().await, dec!(200));
    }

    #[tokio::test]
    async fn test_duplicate_trade_index_rejected() {
        let client = PaperExchangeClient::new(dec!(1000)).with_allowance(dec!(1000));

        client
            .open_position(&account(), &order(Direction::Long, 0, dec!(10)))
            .await
            .unwrap();
        let result = client
            .open_position(&account(), &order(Direction::Short, 0, dec!(10)))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_trade_slot_is_unique_across_pairs() {
        let client = PaperExchangeClient::new(dec!(1000)).with_allowance(dec!(1000));

        client
            .open_position(&account(), &order(Direction::Long, 0, dec!(10)))
            .await
            .unwrap();
        let other_pair = OpenOrder {
            pair_index: 1,
            ..order(Direction::Short, 0, dec!(10))
        };

        assert!(client.open_position(&account(), &other_pair).await.is_err());
        assert_eq!(client.ledger_positions().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_lag_hides_new_positions() {
        let client = PaperExchangeClient::new(dec!(1000))
            .with_allowance(dec!(1000))
            .with_registration_lag(Duration::from_secs(6));

        client
            .open_position(&account(), &order(Direction::Long, 0, dec!(10)))
            .await
            .unwrap();

        assert!(client.list_open_positions(&account()).await.unwrap().is_empty());
        assert_eq!(client.ledger_positions().await.len(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(client.list_open_positions(&account()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_once() {
        let client = PaperExchangeClient::new(dec!(1000)).with_allowance(dec!(1000));
        client.inject(Fault::FailQuery).await;
        client.inject(Fault::RejectOpen(Direction::Short)).await;

        assert!(client.list_open_positions(&account()).await.is_err());
        assert!(client.list_open_positions(&account()).await.is_ok());

        // Long is unaffected by a short fault
        assert!(client
            .open_position(&account(), &order(Direction::Long, 0, dec!(10)))
            .await
            .is_ok());
        assert!(client
            .open_position(&account(), &order(Direction::Short, 1, dec!(10)))
            .await
            .is_err());
        assert!(client
            .open_position(&account(), &order(Direction::Short, 1, dec!(10)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_market_resolves_to_none() {
        let client = PaperExchangeClient::new(dec!(1000)).with_markets(["ETH/USD", "BTC/USD"]);

        assert_eq!(client.resolve_market_index("BTC/USD").await.unwrap(), Some(1));
        assert_eq!(client.resolve_market_index("DOGE/USD").await.unwrap(), None);
    }
}
