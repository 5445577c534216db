//! Post-open reconciliation.
//!
//! A confirmed transaction is not immediately visible to position queries.
//! The waiter polls until the ledger shows the expected count or gives up.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::exchange::{count_directions, Account, ExchangeClient};

/// Poll `list_open_positions` until it returns `expected` positions.
///
/// The first poll is immediate; later polls follow every `poll` until
/// `max_wait` has elapsed. A failed query counts as a non-match.
pub async fn wait_for_positions_registered(
    client: &dyn ExchangeClient,
    account: &Account,
    expected: usize,
    max_wait: Duration,
    poll: Duration,
) -> bool {
    info!(
        account = %account.prefix(),
        expected,
        max_wait_secs = max_wait.as_secs(),
        "Waiting for positions to register"
    );

    let started = Instant::now();
    let deadline = started + max_wait;
    let mut attempt = 0u32;
    let mut last_seen = None;

    loop {
        attempt += 1;
        match client.list_open_positions(account).await {
            Ok(positions) if positions.len() == expected => {
                let (long, short) = count_directions(&positions);
                info!(
                    account = %account.prefix(),
                    long,
                    short,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Positions registered"
                );
                return true;
            }
            Ok(positions) => {
                debug!(attempt, found = positions.len(), expected, "Positions not registered yet");
                last_seen = Some(positions.len());
            }
            Err(e) => {
                warn!(attempt, error = %e, "Position query failed while waiting for registration");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(poll.min(deadline - now)).await;
    }

    error!(
        account = %account.prefix(),
        expected,
        last_seen = ?last_seen,
        "Timed out waiting for positions to register"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Direction, ExchangeError, MockExchangeClient};
    use crate::risk::invariant::fixtures::{pair, position};

    fn account() -> Account {
        Account::new("0x1234567890abcdef")
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_after_lagging_polls() {
        let mut client = MockExchangeClient::new();
        let mut polls = 0;
        client.expect_list_open_positions().returning(move |_| {
            polls += 1;
            if polls <= 8 {
                Ok(vec![position(0, Direction::Long)])
            } else {
                Ok(pair())
            }
        });

        let started = Instant::now();
        let registered = wait_for_positions_registered(
            &client,
            &account(),
            2,
            Duration::from_secs(20),
            Duration::from_secs(2),
        )
        .await;
        let elapsed = started.elapsed();

        assert!(registered);
        assert!(elapsed >= Duration::from_secs(16), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(18), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_count_never_matches() {
        let mut client = MockExchangeClient::new();
        client
            .expect_list_open_positions()
            .returning(|_| Ok(vec![position(0, Direction::Long)]));

        let started = Instant::now();
        let registered = wait_for_positions_registered(
            &client,
            &account(),
            2,
            Duration::from_secs(20),
            Duration::from_secs(2),
        )
        .await;

        assert!(!registered);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_errors_keep_polling() {
        let mut client = MockExchangeClient::new();
        let mut polls = 0;
        client.expect_list_open_positions().returning(move |_| {
            polls += 1;
            if polls == 1 {
                Err(ExchangeError::Unavailable("indexer lagging".to_string()))
            } else {
                Ok(pair())
            }
        });

        assert!(
            wait_for_positions_registered(
                &client,
                &account(),
                2,
                Duration::from_secs(20),
                Duration::from_secs(2),
            )
            .await
        );
    }
}
