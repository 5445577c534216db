//! Flat JSON status record.
//!
//! Maps each account to its last-known position status:
//!
//! ```json
//! { "0xabc...": { "position": "open", "updated_at": "2025-01-01T00:00:00Z" } }
//! ```
//!
//! The record is informational. It is written after state-changing
//! transitions and read by the `status` command, never used to decide
//! anything; the live ledger is the only source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::exchange::Account;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to access status file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("status file {path:?} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => f.write_str("open"),
            PositionStatus::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub position: PositionStatus,
    pub updated_at: DateTime<Utc>,
}

pub type StatusRecord = BTreeMap<String, StatusEntry>;

/// File-backed status store.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record. A missing file is an empty record.
    pub fn load(&self) -> Result<StatusRecord, StatusError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StatusRecord::new()),
            Err(source) => {
                return Err(StatusError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(StatusRecord::new());
        }

        serde_json::from_str(&raw).map_err(|source| StatusError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Set the status of one account.
    pub fn update(&self, account: &Account, status: PositionStatus) -> Result<(), StatusError> {
        let mut record = self.load()?;
        record.insert(
            account.address.clone(),
            StatusEntry {
                position: status,
                updated_at: Utc::now(),
            },
        );
        self.save(&record)?;

        debug!(account = %account.prefix(), %status, "Status record updated");
        Ok(())
    }

    /// Mark every account in the record closed.
    pub fn force_close_all(&self) -> Result<usize, StatusError> {
        let mut record = self.load()?;
        let now = Utc::now();
        for entry in record.values_mut() {
            entry.position = PositionStatus::Closed;
            entry.updated_at = now;
        }
        self.save(&record)?;

        debug!(accounts = record.len(), "Status record force-closed");
        Ok(record.len())
    }

    /// Write via a sibling temp file and rename.
    fn save(&self, record: &StatusRecord) -> Result<(), StatusError> {
        let io_err = |source: std::io::Error| StatusError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(record).map_err(|source| StatusError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, StatusStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("data").join("state.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_update_and_force_close() {
        let (_dir, store) = store();
        let a = Account::new("0xaaaaaaaaaaaaaaaa");
        let b = Account::new("0xbbbbbbbbbbbbbbbb");

        store.update(&a, PositionStatus::Open).unwrap();
        store.update(&b, PositionStatus::Open).unwrap();
        store.update(&b, PositionStatus::Closed).unwrap();

        let record = store.load().unwrap();
        assert_eq!(record[&a.address].position, PositionStatus::Open);
        assert_eq!(record[&b.address].position, PositionStatus::Closed);

        assert_eq!(store.force_close_all().unwrap(), 2);
        let record = store.load().unwrap();
        assert!(record.values().all(|e| e.position == PositionStatus::Closed));
    }

    #[test]
    fn test_on_disk_format() {
        let (_dir, store) = store();
        store
            .update(&Account::new("0xaaaaaaaaaaaaaaaa"), PositionStatus::Open)
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["0xaaaaaaaaaaaaaaaa"]["position"], "open");
        assert!(value["0xaaaaaaaaaaaaaaaa"]["updated_at"].is_string());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load(), Err(StatusError::Parse { .. })));
    }
}
