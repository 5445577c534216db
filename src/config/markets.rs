//! Tradable market list.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One market symbol and whether it may be traded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEntry {
    /// Pair symbol as the venue names it (e.g. "ETH/USD")
    pub symbol: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Ordered list of markets, loaded from a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketList {
    pub markets: Vec<MarketEntry>,
}

impl MarketList {
    /// Load the list from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read market list {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse market list {:?}", path))
    }

    /// Active symbols in file order.
    pub fn active_symbols(&self) -> Vec<String> {
        self.markets
            .iter()
            .filter(|m| m.active)
            .map(|m| m.symbol.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_filters_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markets.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[
                {{"symbol": "ETH/USD", "active": true}},
                {{"symbol": "BTC/USD", "active": false}},
                {{"symbol": "SOL/USD"}}
            ]"#
        )
        .unwrap();

        let list = MarketList::load(&path).unwrap();
        assert_eq!(list.markets.len(), 3);
        assert_eq!(list.active_symbols(), vec!["ETH/USD", "SOL/USD"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(MarketList::load("does/not/exist.json").is_err());
    }
}
