//! REST client for the exchange gateway.
//!
//! The gateway wraps the venue SDK: it builds, signs and submits
//! transactions and waits for receipts. This client only speaks signed JSON.

use crate::config::GatewayConfig;
use crate::exchange::traits::{ExchangeClient, ExchangeError, ExchangeResult};
use crate::exchange::types::*;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

/// Fixed pause between retries of idempotent reads.
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Signed JSON client for the exchange gateway.
pub struct GatewayClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    read_retries: u32,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(with = "rust_decimal::serde::str")]
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct AllowanceResponse {
    #[serde(with = "rust_decimal::serde::str")]
    allowance: Decimal,
}

#[derive(Debug, Deserialize)]
struct PairIndexResponse {
    pair_index: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
    trader: &'a str,
    #[serde(flatten)]
    order: &'a OpenOrder,
    slippage_percentage: u32,
}

#[derive(Debug, Serialize)]
struct CloseRequest<'a> {
    trader: &'a str,
    #[serde(flatten)]
    order: &'a CloseOrder,
}

#[derive(Debug, Serialize)]
struct AllowanceRequest<'a> {
    trader: &'a str,
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
}

impl GatewayClient {
    /// Create a new gateway client from configuration.
    pub fn new(config: &GatewayConfig, read_retries: u32) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            read_retries: read_retries.max(1),
        })
    }

    /// HMAC-SHA256 over `timestamp + method + path + body`, hex encoded.
    fn sign(&self, timestamp: u64, method: &Method, path: &str, body: &str) -> String {
        let payload = format!("{}{}{}{}", timestamp, method.as_str(), path, body);
        // HMAC accepts keys of any length, so this never fails.
        let mut mac = match Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> ExchangeResult<T> {
        let body = body.unwrap_or_default();
        let timestamp = Self::timestamp();
        let signature = self.sign(timestamp, &method, path, &body);
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http
            .request(method, &url)
            .header("X-API-KEY", &self.api_key)
            .header("X-TIMESTAMP", timestamp.to_string())
            .header("X-SIGNATURE", signature);

        if !body.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(ExchangeError::from)
    }

    /// GET with fixed-delay retries; reads are idempotent.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> ExchangeResult<T> {
        let mut attempt = 1;
        loop {
            match self.send(Method::GET, path, None).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.read_retries => {
                    warn!(%path, attempt, retries = self.read_retries, error = %e, "Gateway read failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// POST a transaction request. Never retried: a resubmission could double-open.
    async fn submit<B: Serialize>(&self, path: &str, body: &B) -> ExchangeResult<TxReceipt> {
        let body = serde_json::to_string(body).map_err(|e| ExchangeError::Decode(e.to_string()))?;
        let receipt: TxReceipt = self.send(Method::POST, path, Some(body)).await?;

        if !receipt.succeeded() {
            return Err(ExchangeError::Reverted {
                tx_hash: receipt.transaction_hash,
                status: receipt.status,
            });
        }

        Ok(receipt)
    }
}

#[async_trait]
impl ExchangeClient for GatewayClient {
    #[instrument(skip(self, order), fields(trader = %account.prefix()))]
    async fn open_position(
        &self,
        account: &Account,
        order: &OpenOrder,
    ) -> ExchangeResult<TxReceipt> {
        let request = OpenRequest {
            trader: &account.address,
            order,
            slippage_percentage: 1,
        };
        self.submit("/v1/trades/open", &request).await
    }

    #[instrument(skip(self, order), fields(trader = %account.prefix()))]
    async fn close_position(
        &self,
        account: &Account,
        order: &CloseOrder,
    ) -> ExchangeResult<TxReceipt> {
        let request = CloseRequest {
            trader: &account.address,
            order,
        };
        self.submit("/v1/trades/close", &request).await
    }

    #[instrument(skip(self), fields(trader = %account.prefix()))]
    async fn list_open_positions(&self, account: &Account) -> ExchangeResult<Vec<Position>> {
        let path = format!("/v1/trades?trader={}", urlencoding::encode(&account.address));
        let positions: Vec<Position> = self.get(&path).await?;
        debug!(count = positions.len(), "Fetched open positions");
        Ok(positions)
    }

    #[instrument(skip(self), fields(trader = %account.prefix()))]
    async fn get_balance(&self, account: &Account) -> ExchangeResult<Decimal> {
        let path = format!("/v1/balance?trader={}", urlencoding::encode(&account.address));
        let response: BalanceResponse = self.get(&path).await?;
        Ok(response.balance)
    }

    #[instrument(skip(self))]
    async fn resolve_market_index(&self, symbol: &str) -> ExchangeResult<Option<u32>> {
        let path = format!("/v1/pairs/index?symbol={}", urlencoding::encode(symbol));
        let response: PairIndexResponse = self.get(&path).await?;
        Ok(response.pair_index)
    }

    #[instrument(skip(self), fields(trader = %account.prefix()))]
    async fn get_allowance(&self, account: &Account) -> ExchangeResult<Decimal> {
        let path = format!("/v1/allowance?trader={}", urlencoding::encode(&account.address));
        let response: AllowanceResponse = self.get(&path).await?;
        Ok(response.allowance)
    }

    #[instrument(skip(self), fields(trader = %account.prefix()))]
    async fn set_allowance(&self, account: &Account, amount: Decimal) -> ExchangeResult<TxReceipt> {
        let request = AllowanceRequest {
            trader: &account.address,
            amount,
        };
        self.submit("/v1/allowance", &request).await
    }
}
