//! Cycle controller: the top-level trading state machine.
//!
//! One cycle walks
//! `CHECK_EXISTING → SELECT_MARKET → SIZE_ORDER → OPEN_PAIR → VERIFY_PAIR →
//! MONITOR → CLOSE_PAIR` and reports a [`CycleOutcome`]. The run loop turns
//! each outcome into a pause (or a stop) before the next cycle.
//!
//! Every decision is taken on a fresh read of the ledger; nothing cached
//! from a previous step is trusted.

use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};

use super::legs::{self, CloseSummary};
use super::opener::PositionOpener;
use super::sizing::{max_order_value, split_order_value};
use crate::config::{IntRange, TimingConfig, TradingConfig};
use crate::exchange::{Account, ExchangeClient, ExchangeError, Position};
use crate::persistence::{PositionStatus, StatusStore};
use crate::risk::{
    AlertSeverity, BreakerState, FailureBreaker, PairShape, RiskAlert, RiskAlertKind, Watchdog,
};

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Pair opened, held, and closed
    Completed { pair_index: u32, closed: usize },
    /// Leftover positions were found and closed; nothing opened
    ForceClosedStrays { count: usize },
    /// Active market list is empty
    NoActiveMarkets,
    /// No active market resolved to an index
    NoMarket,
    /// Balance too small for the minimum leg size
    Undersized,
    BalanceUnavailable,
    /// Initial position check failed
    QueryFailed,
    /// Positions-open flag was already set
    GateBusy,
    /// Open attempt failed; breaker still armed
    OpenFailed { failures: u32 },
    /// Pair opened but did not verify; liquidated
    VerifyFailed,
    /// Pair broke while held; liquidated
    WatchdogAnomaly,
    /// Consecutive-failure ceiling reached
    Halted,
}

/// Guard over the positions-open flag.
pub struct OpenGuard<'a>(MutexGuard<'a, bool>);

impl OpenGuard<'_> {
    pub fn is_open(&self) -> bool {
        *self.0
    }

    pub fn set_open(&mut self, open: bool) {
        *self.0 = open;
    }
}

/// Process-lifetime state of the controller.
#[derive(Debug)]
pub struct CycleState {
    cycle: AtomicU64,
    breaker: FailureBreaker,
    positions_open: Mutex<bool>,
}

impl CycleState {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            cycle: AtomicU64::new(0),
            breaker: FailureBreaker::new(max_consecutive_failures),
            positions_open: Mutex::new(false),
        }
    }

    /// Advance and return the cycle number (first cycle is 1).
    pub fn next_cycle(&self) -> u64 {
        self.cycle.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::Acquire)
    }

    pub fn breaker(&self) -> &FailureBreaker {
        &self.breaker
    }

    /// Take the open lock. Serializes the open/verify transition.
    pub async fn open_gate(&self) -> OpenGuard<'_> {
        OpenGuard(self.positions_open.lock().await)
    }
}

pub struct CycleController {
    client: Arc<dyn ExchangeClient>,
    account: Account,
    trading: TradingConfig,
    timing: TimingConfig,
    markets: Vec<String>,
    status: Option<StatusStore>,
    opener: PositionOpener,
    state: CycleState,
}

impl CycleController {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        account: Account,
        trading: TradingConfig,
        timing: TimingConfig,
        markets: Vec<String>,
    ) -> Self {
        let opener = PositionOpener::new(
            client.clone(),
            account.clone(),
            trading.max_leverage,
            trading.allowance_multiplier,
            timing.clone(),
        );
        let state = CycleState::new(trading.max_consecutive_failures);

        Self {
            client,
            account,
            trading,
            timing,
            markets,
            status: None,
            opener,
            state,
        }
    }

    pub fn with_status_store(mut self, store: StatusStore) -> Self {
        self.status = Some(store);
        self
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// Run cycles until halted or out of markets. Returns the final outcome.
    pub async fn run(&self) -> CycleOutcome {
        info!(
            account = %self.account.prefix(),
            markets = self.markets.len(),
            "Trading loop started"
        );

        loop {
            let outcome = self.run_cycle().await;

            let Some(pause) = self.pause_after(&outcome) else {
                match outcome {
                    CycleOutcome::Halted => error!("Trading halted - operator intervention required"),
                    _ => warn!(?outcome, "Trading loop stopped"),
                }
                return outcome;
            };

            if !pause.is_zero() {
                info!(?outcome, pause_secs = pause.as_secs(), "Waiting before next cycle");
                sleep(pause).await;
            }
        }
    }

    /// Execute one cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let number = self.state.next_cycle();
        self.cycle(number)
            .instrument(info_span!("cycle", number, account = %self.account.prefix()))
            .await
    }

    async fn cycle(&self, number: u64) -> CycleOutcome {
        if self.state.breaker().is_tripped() {
            return CycleOutcome::Halted;
        }

        info!(number, "Cycle started - checking open positions");

        // CHECK_EXISTING
        match self.client.list_open_positions(&self.account).await {
            Ok(positions) if !positions.is_empty() => {
                let count = positions.len();
                self.clear_strays(positions).await;
                return CycleOutcome::ForceClosedStrays { count };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Position check failed - skipping cycle");
                return CycleOutcome::QueryFailed;
            }
        }

        if self.markets.is_empty() {
            return CycleOutcome::NoActiveMarkets;
        }

        // SELECT_MARKET
        let Some((symbol, pair_index)) = self.select_market().await else {
            error!("No tradable market found");
            return CycleOutcome::NoMarket;
        };

        // SIZE_ORDER
        let balance = match self.client.get_balance(&self.account).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Balance query failed - skipping cycle");
                return CycleOutcome::BalanceUnavailable;
            }
        };

        let cap = max_order_value(
            Decimal::from(self.trading.order_value_usd.max),
            balance,
            self.trading.max_leverage,
        );
        if cap.is_zero() {
            warn!(%balance, "Maximum order value is zero - skipping cycle");
            return CycleOutcome::Undersized;
        }

        let raw = Decimal::from(sample(self.trading.order_value_usd));
        let order_value = raw.min(cap);
        let hold_minutes = sample(self.trading.order_duration_min);
        let legs = split_order_value(
            order_value,
            self.trading.orders_distribution_noise,
            &mut rand::rng(),
        );

        if legs.below(self.trading.min_position_usd) {
            error!(
                long = %legs.long,
                short = %legs.short,
                minimum = %self.trading.min_position_usd,
                "Leg below minimum position size - raise order_value_usd.min"
            );
            return CycleOutcome::Undersized;
        }

        info!(
            %symbol,
            pair_index,
            %raw,
            %cap,
            long = %legs.long,
            short = %legs.short,
            hold_minutes,
            "Starting trade"
        );

        // OPEN_PAIR + VERIFY_PAIR under the open lock
        {
            let mut gate = self.state.open_gate().await;
            if gate.is_open() {
                error!("Positions already flagged open - skipping cycle");
                return CycleOutcome::GateBusy;
            }

            if let Err(e) = self.opener.open_pair(pair_index, legs).await {
                error!(%symbol, error = %e, "Pair open failed");
                return match self.state.breaker().record_failure(self.account.prefix()) {
                    BreakerState::Tripped { .. } => CycleOutcome::Halted,
                    BreakerState::Armed { failures } => CycleOutcome::OpenFailed { failures },
                };
            }
            gate.set_open(true);

            sleep(self.timing.verify_grace()).await;
            if !self.verify_pair().await {
                self.liquidate("verification failed").await;
                gate.set_open(false);
                return CycleOutcome::VerifyFailed;
            }

            self.state.breaker().record_success();
            self.record_status(PositionStatus::Open);
        }

        // MONITOR
        let watchdog = Watchdog::new(
            self.client.clone(),
            self.account.clone(),
            self.timing.watchdog_poll(),
            self.timing.watchdog_log(),
        );
        let held = watchdog
            .start_monitoring(Duration::from_secs(hold_minutes * 60))
            .await;

        if !held {
            self.liquidate("watchdog anomaly").await;
            self.state.open_gate().await.set_open(false);
            return CycleOutcome::WatchdogAnomaly;
        }

        // CLOSE_PAIR
        info!("Holding period over - closing pair");
        let closed = self
            .liquidate("cycle complete")
            .await
            .map(|summary| summary.closed)
            .unwrap_or(0);
        self.state.open_gate().await.set_open(false);

        CycleOutcome::Completed { pair_index, closed }
    }

    /// Sample active markets without replacement until one resolves.
    pub async fn select_market(&self) -> Option<(String, u32)> {
        let mut candidates = self.markets.clone();
        candidates.shuffle(&mut rand::rng());

        for symbol in candidates {
            match self.client.resolve_market_index(&symbol).await {
                Ok(Some(index)) => {
                    info!(%symbol, pair_index = index, "Market selected");
                    return Some((symbol, index));
                }
                Ok(None) => warn!(%symbol, "Market not listed on venue"),
                Err(e) => warn!(%symbol, error = %e, "Failed to resolve market"),
            }
        }
        None
    }

    /// Close every open position and mark the account closed.
    pub async fn close_all_positions(&self) -> Result<CloseSummary, ExchangeError> {
        let summary = legs::close_all_positions(self.client.as_ref(), &self.account).await?;
        self.record_status(PositionStatus::Closed);
        Ok(summary)
    }

    /// Require exactly one long and one short.
    async fn verify_pair(&self) -> bool {
        let positions = match self.client.list_open_positions(&self.account).await {
            Ok(positions) => positions,
            Err(e) => {
                error!(error = %e, "Could not verify pair");
                return false;
            }
        };

        let shape = PairShape::of(&positions);
        if shape == PairShape::Balanced {
            info!(%shape, "Pair verified - delta neutral");
            return true;
        }

        let (long, short) = match shape {
            PairShape::Broken { long, short } => (long, short),
            _ => (0, 0),
        };
        error!(%shape, found = positions.len(), "Expected exactly 1L + 1S after open");
        RiskAlert::new(
            self.account.prefix(),
            RiskAlertKind::InvariantViolation {
                long,
                short,
                stage: "verify".to_string(),
            },
            AlertSeverity::Error,
            format!("post-open verification found {}", shape),
        )
        .emit();
        false
    }

    async fn clear_strays(&self, positions: Vec<Position>) {
        let shape = PairShape::of(&positions);
        warn!(total = positions.len(), %shape, "Open positions found before cycle");
        if let PairShape::Broken { long, short } = shape {
            RiskAlert::new(
                self.account.prefix(),
                RiskAlertKind::InvariantViolation {
                    long,
                    short,
                    stage: "check".to_string(),
                },
                AlertSeverity::Warning,
                format!("leftover positions found before cycle: {}", shape),
            )
            .emit();
        }
        for (i, position) in positions.iter().enumerate() {
            warn!(
                n = i + 1,
                direction = %position.direction,
                collateral = %position.collateral,
                trade_index = position.trade_index,
                "Stray position"
            );
        }

        self.liquidate("stray positions").await;
        if let Some(store) = &self.status {
            if let Err(e) = store.force_close_all() {
                warn!(error = %e, "Failed to reset status record");
            }
        }
        sleep(self.timing.stray_settle()).await;

        match self.client.list_open_positions(&self.account).await {
            Ok(remaining) if !remaining.is_empty() => {
                error!(remaining = remaining.len(), "Positions still open - closing again");
                self.liquidate("stray positions").await;
                sleep(self.timing.stray_settle()).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not re-check stray positions"),
        }
    }

    /// Close all, logging instead of propagating.
    async fn liquidate(&self, reason: &str) -> Option<CloseSummary> {
        info!(reason, "Closing all positions");
        match self.close_all_positions().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(reason, error = %e, "Close-all failed - next cycle will retry");
                None
            }
        }
    }

    fn record_status(&self, status: PositionStatus) {
        if let Some(store) = &self.status {
            if let Err(e) = store.update(&self.account, status) {
                warn!(error = %e, "Failed to write status record");
            }
        }
    }

    /// Pause before the next cycle; `None` stops the loop.
    fn pause_after(&self, outcome: &CycleOutcome) -> Option<Duration> {
        let cooldown = || Duration::from_secs(sample(self.trading.delay_between_trading_cycles_min) * 60);

        match outcome {
            CycleOutcome::Completed { .. } | CycleOutcome::OpenFailed { .. } => Some(cooldown()),
            CycleOutcome::ForceClosedStrays { .. } | CycleOutcome::WatchdogAnomaly => {
                Some(Duration::ZERO)
            }
            CycleOutcome::NoMarket
            | CycleOutcome::Undersized
            | CycleOutcome::BalanceUnavailable
            | CycleOutcome::QueryFailed => Some(self.timing.retry_later()),
            CycleOutcome::GateBusy => Some(self.timing.gate_busy()),
            CycleOutcome::VerifyFailed => Some(self.timing.verify_failure_delay()),
            CycleOutcome::NoActiveMarkets | CycleOutcome::Halted => None,
        }
    }
}

fn sample(range: IntRange) -> u64 {
    range.sample(&mut rand::rng())
}
