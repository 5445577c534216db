//! Configuration management for the pair cycler.
//!
//! Loads settings from environment variables and config files.

mod markets;
pub mod timing;

pub use markets::{MarketEntry, MarketList};
pub use timing::TimingConfig;

use anyhow::{Context, Result};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Trading account
    #[serde(default)]
    pub account: AccountConfig,
    /// Exchange gateway connection
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Cycle sizing and pacing
    #[serde(default)]
    pub trading: TradingConfig,
    /// Settlement and polling delays
    #[serde(default)]
    pub timing: TimingConfig,
    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// Paper trading simulation
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Trader address the gateway signs for
    #[serde(default = "default_address")]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the exchange gateway
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret for request signing
    #[serde(default)]
    pub api_secret: String,
    /// Request timeout; covers waiting for a transaction receipt
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

/// Inclusive integer range sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: u64,
    pub max: u64,
}

impl IntRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Draw a value in `[min, max]`.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        if self.min >= self.max {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Total pair notional in USD, drawn per cycle
    #[serde(default = "default_order_value")]
    pub order_value_usd: IntRange,
    /// Leverage for both legs; also caps notional against balance
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    /// Holding duration in minutes
    #[serde(default = "default_order_duration")]
    pub order_duration_min: IntRange,
    /// Cooldown / back-off between cycles in minutes
    #[serde(default = "default_cycle_delay")]
    pub delay_between_trading_cycles_min: IntRange,
    /// Random skew of the long/short split (0.0-1.0)
    #[serde(default)]
    pub orders_distribution_noise: Decimal,
    /// Attempts for idempotent gateway reads
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Smallest leg the venue accepts, in USD
    #[serde(default = "default_min_position_usd")]
    pub min_position_usd: Decimal,
    /// Consecutive open failures before halting
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Allowance requested as a multiple of the pair's total collateral
    #[serde(default = "default_allowance_multiplier")]
    pub allowance_multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON array of `{symbol, active}`
    #[serde(default = "default_markets_file")]
    pub markets_file: String,
    /// Flat JSON status record
    #[serde(default = "default_status_file")]
    pub status_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Starting balance of the paper ledger
    #[serde(default = "default_paper_balance")]
    pub initial_balance: Decimal,
    /// Seconds before a confirmed paper open becomes visible
    #[serde(default = "default_paper_lag")]
    pub registration_lag_secs: u64,
}

// Default value functions
fn default_address() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8600".to_string()
}

fn default_gateway_timeout() -> u64 {
    90
}

fn default_order_value() -> IntRange {
    IntRange::new(20, 40)
}

fn default_max_leverage() -> u32 {
    10
}

fn default_order_duration() -> IntRange {
    IntRange::new(5, 15)
}

fn default_cycle_delay() -> IntRange {
    IntRange::new(1, 5)
}

fn default_retries() -> u32 {
    3
}

fn default_min_position_usd() -> Decimal {
    Decimal::new(10, 0) // $10 per leg
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_allowance_multiplier() -> Decimal {
    Decimal::new(3, 0) // amortizes approvals over future cycles
}

fn default_markets_file() -> String {
    "data/markets.json".to_string()
}

fn default_status_file() -> String {
    "data/state.json".to_string()
}

fn default_paper_balance() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_paper_lag() -> u64 {
    4
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("DPC"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let trading = &self.trading;

        anyhow::ensure!(
            trading.order_value_usd.is_ordered(),
            "order_value_usd.min must be <= order_value_usd.max"
        );
        anyhow::ensure!(
            trading.order_duration_min.is_ordered(),
            "order_duration_min.min must be <= order_duration_min.max"
        );
        anyhow::ensure!(
            trading.delay_between_trading_cycles_min.is_ordered(),
            "delay_between_trading_cycles_min.min must be <= max"
        );
        anyhow::ensure!(
            trading.orders_distribution_noise >= Decimal::ZERO
                && trading.orders_distribution_noise <= Decimal::ONE,
            "orders_distribution_noise must be between 0 and 1"
        );
        anyhow::ensure!(trading.max_leverage >= 1, "max_leverage must be >= 1");
        anyhow::ensure!(
            trading.max_consecutive_failures >= 1,
            "max_consecutive_failures must be >= 1"
        );
        anyhow::ensure!(
            trading.allowance_multiplier >= Decimal::ONE,
            "allowance_multiplier must be >= 1"
        );
        let timing = &self.timing;
        anyhow::ensure!(
            timing.watchdog_poll_secs >= 1,
            "timing.watchdog_poll_secs must be >= 1"
        );
        anyhow::ensure!(
            timing.registration_poll_secs >= 1,
            "timing.registration_poll_secs must be >= 1"
        );
        anyhow::ensure!(
            timing.registration_max_wait_secs >= timing.registration_poll_secs,
            "timing.registration_max_wait_secs must be >= registration_poll_secs"
        );
        anyhow::ensure!(
            !self.account.address.is_empty(),
            "account.address must be set"
        );

        Ok(())
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            api_key: String::new(),
            api_secret: String::new(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            order_value_usd: default_order_value(),
            max_leverage: default_max_leverage(),
            order_duration_min: default_order_duration(),
            delay_between_trading_cycles_min: default_cycle_delay(),
            orders_distribution_noise: Decimal::ZERO,
            retries: default_retries(),
            min_position_usd: default_min_position_usd(),
            max_consecutive_failures: default_max_consecutive_failures(),
            allowance_multiplier: default_allowance_multiplier(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            markets_file: default_markets_file(),
            status_file: default_status_file(),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_paper_balance(),
            registration_lag_secs: default_paper_lag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.max_consecutive_failures, 3);
        assert_eq!(config.timing.leg_settle_secs, timing::LEG_SETTLE_DELAY_SECS);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = Config::default();
        config.trading.order_value_usd = IntRange::new(50, 20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_noise_out_of_bounds_rejected() {
        let mut config = Config::default();
        config.trading.orders_distribution_noise = dec!(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_intervals_rejected() {
        let mut config = Config::default();
        config.timing.watchdog_poll_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timing.registration_poll_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_registration_wait_shorter_than_poll_rejected() {
        let mut config = Config::default();
        config.timing.registration_poll_secs = 5;
        config.timing.registration_max_wait_secs = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_int_range_sample_bounds() {
        let mut rng = rand::rng();
        let range = IntRange::new(3, 7);
        for _ in 0..100 {
            let v = range.sample(&mut rng);
            assert!((3..=7).contains(&v));
        }
        assert_eq!(IntRange::new(4, 4).sample(&mut rng), 4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let raw = r#"
            [trading]
            max_leverage = 5
            order_value_usd = { min = 100, max = 200 }

            [timing]
            leg_settle_secs = 4
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.trading.max_leverage, 5);
        assert_eq!(config.trading.order_value_usd, IntRange::new(100, 200));
        assert_eq!(config.trading.retries, 3);
        assert_eq!(config.timing.leg_settle_secs, 4);
        assert_eq!(config.timing.watchdog_poll_secs, timing::WATCHDOG_POLL_SECS);
    }
}
