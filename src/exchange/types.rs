//! Type definitions shared by every exchange client implementation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading account managed by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Short address prefix used to tag log lines (first 10 chars).
    pub fn prefix(&self) -> &str {
        match self.address.char_indices().nth(10) {
            Some((idx, _)) => &self.address[..idx],
            None => &self.address,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn is_long(&self) -> bool {
        matches!(self, Direction::Long)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open leveraged position as reported by the exchange ledger.
///
/// This is a projection only; callers re-query before acting on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub pair_index: u32,
    /// Storage slot of the position on the account
    pub trade_index: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral: Decimal,
    pub direction: Direction,
    #[serde(with = "rust_decimal::serde::str")]
    pub leverage: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub open_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub liquidation_price: Decimal,
    /// Accrued margin fee
    #[serde(with = "rust_decimal::serde::str")]
    pub margin_fee: Decimal,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction.is_long()
    }
}

/// Confirmation of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// 1 = success, anything else = reverted
    pub status: u8,
    pub transaction_hash: String,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }

    /// First 10 characters of the hash, for log lines.
    pub fn short_hash(&self) -> &str {
        match self.transaction_hash.char_indices().nth(10) {
            Some((idx, _)) => &self.transaction_hash[..idx],
            None => &self.transaction_hash,
        }
    }
}

/// Request to open one leg of the pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenOrder {
    pub pair_index: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral: Decimal,
    pub direction: Direction,
    pub leverage: u32,
    pub trade_index: u32,
}

/// Request to close one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseOrder {
    pub pair_index: u32,
    pub trade_index: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral: Decimal,
}

impl From<&Position> for CloseOrder {
    fn from(position: &Position) -> Self {
        Self {
            pair_index: position.pair_index,
            trade_index: position.trade_index,
            collateral: position.collateral,
        }
    }
}

/// Count positions by direction, returning `(long, short)`.
pub fn count_directions(positions: &[Position]) -> (usize, usize) {
    let long = positions.iter().filter(|p| p.is_long()).count();
    (long, positions.len() - long)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_prefix() {
        let account = Account::new("0x1234567890abcdef");
        assert_eq!(account.prefix(), "0x12345678");

        let short = Account::new("paper");
        assert_eq!(short.prefix(), "paper");
    }

    #[test]
    fn test_position_deserializes_gateway_payload() {
        let json = r#"{
            "pair_index": 1,
            "trade_index": 0,
            "collateral": "50.5",
            "direction": "LONG",
            "leverage": "10",
            "open_price": "3200.12",
            "take_profit": "3500",
            "liquidation_price": "2900",
            "margin_fee": "0.01"
        }"#;

        let position: Position = serde_json::from_str(json).unwrap();
        assert!(position.is_long());
        assert_eq!(position.collateral, dec!(50.5));
        assert_eq!(position.take_profit, Some(dec!(3500)));
        assert_eq!(position.stop_loss, None);
    }

    #[test]
    fn test_receipt_status() {
        let ok = TxReceipt {
            status: 1,
            transaction_hash: "0xabcdef0123456789".to_string(),
        };
        assert!(ok.succeeded());
        assert_eq!(ok.short_hash(), "0xabcdef01");

        let reverted = TxReceipt {
            status: 0,
            transaction_hash: "0x00".to_string(),
        };
        assert!(!reverted.succeeded());
    }
}
