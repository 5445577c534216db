//! Holding-period watchdog.
//!
//! Polls the open positions on a fixed interval while a pair is held and
//! reports whether the pair stayed intact. It never closes anything itself;
//! the controller acts on the result.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::breaker::{AlertSeverity, RiskAlert, RiskAlertKind};
use super::invariant::PairAnomaly;
use crate::exchange::{count_directions, Account, ExchangeClient};

pub struct Watchdog {
    client: Arc<dyn ExchangeClient>,
    account: Account,
    expected: usize,
    poll_interval: Duration,
    log_interval: Duration,
}

impl Watchdog {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        account: Account,
        poll_interval: Duration,
        log_interval: Duration,
    ) -> Self {
        Self {
            client,
            account,
            expected: 2,
            poll_interval,
            log_interval,
        }
    }

    /// Monitor for `duration`. Returns `true` if no anomaly was seen.
    pub async fn start_monitoring(&self, duration: Duration) -> bool {
        info!(
            account = %self.account.prefix(),
            poll_secs = self.poll_interval.as_secs(),
            duration_secs = duration.as_secs(),
            "Watchdog started"
        );

        let deadline = Instant::now() + duration;
        let mut last_log: Option<Instant> = None;
        let mut polls = 0u32;

        while Instant::now() < deadline {
            polls += 1;
            match self.client.list_open_positions(&self.account).await {
                Ok(positions) => {
                    let (long, short) = count_directions(&positions);

                    if last_log.map_or(true, |at| at.elapsed() >= self.log_interval) {
                        info!(total = positions.len(), long, short, "Watchdog status");
                        last_log = Some(Instant::now());
                    }

                    if let Some(anomaly) = PairAnomaly::detect(&positions, self.expected) {
                        self.report(anomaly, long, short);
                        return false;
                    }
                }
                Err(e) => {
                    warn!(poll = polls, error = %e, "Watchdog position query failed, skipping poll");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }

        debug!(polls, "Watchdog finished");
        info!(account = %self.account.prefix(), "Holding period completed without anomalies");
        true
    }

    fn report(&self, anomaly: PairAnomaly, long: usize, short: usize) {
        error!(
            account = %self.account.prefix(),
            expected = self.expected,
            long,
            short,
            anomaly = anomaly.describe(),
            "Watchdog anomaly detected"
        );
        RiskAlert::new(
            self.account.prefix(),
            RiskAlertKind::InvariantViolation {
                long,
                short,
                stage: "monitor".to_string(),
            },
            AlertSeverity::Error,
            anomaly.describe().to_string(),
        )
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Direction, ExchangeError, MockExchangeClient};
    use crate::risk::invariant::fixtures::{pair, position};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn watchdog(client: MockExchangeClient) -> Watchdog {
        Watchdog::new(
            Arc::new(client),
            Account::new("0x1234567890abcdef"),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_leg_after_n_polls_is_anomaly() {
        const HEALTHY_POLLS: usize = 4;
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let mut client = MockExchangeClient::new();
        client.expect_list_open_positions().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= HEALTHY_POLLS {
                Ok(pair())
            } else {
                Ok(vec![position(0, Direction::Long)])
            }
        });

        let ok = watchdog(client).start_monitoring(Duration::from_secs(600)).await;

        assert!(!ok);
        assert!(polls.load(Ordering::SeqCst) <= HEALTHY_POLLS + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_pair_runs_full_duration() {
        let mut client = MockExchangeClient::new();
        client.expect_list_open_positions().returning(|_| Ok(pair()));

        let started = Instant::now();
        let ok = watchdog(client).start_monitoring(Duration::from_secs(60)).await;

        assert!(ok);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_split_is_anomaly() {
        let mut client = MockExchangeClient::new();
        client.expect_list_open_positions().returning(|_| {
            Ok(vec![position(0, Direction::Long), position(1, Direction::Long)])
        });

        assert!(!watchdog(client).start_monitoring(Duration::from_secs(60)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failure_is_not_anomaly() {
        let mut client = MockExchangeClient::new();
        let mut polls = 0;
        client.expect_list_open_positions().returning(move |_| {
            polls += 1;
            if polls % 2 == 0 {
                Err(ExchangeError::Transport("connection reset".to_string()))
            } else {
                Ok(pair())
            }
        });

        assert!(watchdog(client).start_monitoring(Duration::from_secs(30)).await);
    }
}
