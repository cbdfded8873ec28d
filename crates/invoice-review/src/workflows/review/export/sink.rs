use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::workflows::review::domain::UserId;

/// Identifier of an export ledger (one per connected user).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub String);

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user's connected export account and the ledger remembered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConnection {
    pub account: String,
    pub ledger: Option<LedgerId>,
}

/// Where per-user export connections live.
pub trait ExportCredentialStore: Send + Sync {
    fn connection(&self, user: &UserId) -> Result<Option<ExportConnection>, ExportSinkError>;

    fn remember_ledger(&self, user: &UserId, ledger: &LedgerId) -> Result<(), ExportSinkError>;
}

/// External destination for approved invoice rows.
pub trait ExportSink: Send + Sync {
    fn create_ledger(&self, connection: &ExportConnection) -> Result<LedgerId, ExportSinkError>;

    /// First row of the ledger, if it has any rows.
    fn header(&self, ledger: &LedgerId) -> Result<Option<Vec<String>>, ExportSinkError>;

    fn append_row(&self, ledger: &LedgerId, row: &[String]) -> Result<(), ExportSinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExportSinkError {
    #[error("ledger {0} does not exist")]
    LedgerNotFound(LedgerId),
    #[error("ledger io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ledger could not be encoded: {0}")]
    Csv(#[from] csv::Error),
    #[error("export destination unavailable: {0}")]
    Unavailable(String),
}

/// Ledgers as CSV files, `<dir>/<ledger id>.csv`.
#[derive(Debug, Clone)]
pub struct CsvLedgerSink {
    dir: PathBuf,
}

impl CsvLedgerSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, ledger: &LedgerId) -> PathBuf {
        self.dir.join(format!("{}.csv", ledger.0))
    }

    fn existing(&self, ledger: &LedgerId) -> Result<PathBuf, ExportSinkError> {
        let path = self.path_of(ledger);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ExportSinkError::LedgerNotFound(ledger.clone()))
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExportSinkError + '_ {
    move |source| ExportSinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl ExportSink for CsvLedgerSink {
    fn create_ledger(&self, connection: &ExportConnection) -> Result<LedgerId, ExportSinkError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let ledger = LedgerId(format!(
            "invoice-ledger-{}-{}",
            Utc::now().format("%Y-%m-%d"),
            Uuid::new_v4().simple()
        ));
        let path = self.path_of(&ledger);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_error(&path))?;
        info!(ledger = %ledger, account = %connection.account, "export ledger created");
        Ok(ledger)
    }

    fn header(&self, ledger: &LedgerId) -> Result<Option<Vec<String>>, ExportSinkError> {
        let path = self.existing(ledger)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;
        match reader.records().next() {
            Some(record) => Ok(Some(record?.iter().map(str::to_string).collect())),
            None => Ok(None),
        }
    }

    fn append_row(&self, ledger: &LedgerId, row: &[String]) -> Result<(), ExportSinkError> {
        let path = self.existing(ledger)?;
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        writer.write_record(row)?;
        writer.flush().map_err(io_error(&path))?;
        Ok(())
    }
}

/// Process-local export connections.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    connections: Mutex<HashMap<UserId, ExportConnection>>,
}

impl MemoryCredentialStore {
    pub fn connect(&self, user: UserId, account: impl Into<String>) {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                user,
                ExportConnection {
                    account: account.into(),
                    ledger: None,
                },
            );
    }
}

impl ExportCredentialStore for MemoryCredentialStore {
    fn connection(&self, user: &UserId) -> Result<Option<ExportConnection>, ExportSinkError> {
        Ok(self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned())
    }

    fn remember_ledger(&self, user: &UserId, ledger: &LedgerId) -> Result<(), ExportSinkError> {
        let mut connections = self.connections.lock().unwrap_or_else(PoisonError::into_inner);
        let connection = connections.get_mut(user).ok_or_else(|| {
            ExportSinkError::Unavailable(format!("no export connection for {user}"))
        })?;
        connection.ledger = Some(ledger.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_ledger_keeps_its_first_row_as_header() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = CsvLedgerSink::new(dir.path().join("ledgers"));
        let connection = ExportConnection {
            account: "finance@example.ee".to_string(),
            ledger: None,
        };

        let ledger = sink.create_ledger(&connection).expect("ledger created");
        assert_eq!(sink.header(&ledger).expect("readable"), None);

        let header = vec!["invoice_number".to_string(), "total_amount".to_string()];
        sink.append_row(&ledger, &header).expect("header appended");
        sink.append_row(&ledger, &["INV-1".to_string(), "12, 5".to_string()])
            .expect("row appended");

        assert_eq!(sink.header(&ledger).expect("readable"), Some(header));
        let contents = fs::read_to_string(sink.path_of(&ledger)).expect("ledger file");
        assert_eq!(contents, "invoice_number,total_amount\nINV-1,\"12, 5\"\n");
    }

    #[test]
    fn unknown_ledgers_are_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = CsvLedgerSink::new(dir.path());
        let missing = LedgerId("nope".to_string());
        assert!(matches!(
            sink.append_row(&missing, &["x".to_string()]),
            Err(ExportSinkError::LedgerNotFound(_))
        ));
    }

    #[test]
    fn remembered_ledger_is_returned_with_connection() {
        let store = MemoryCredentialStore::default();
        let user = UserId("u-reviewer".to_string());
        assert_eq!(store.connection(&user).expect("lookup"), None);

        store.connect(user.clone(), "reviewer@example.ee");
        store
            .remember_ledger(&user, &LedgerId("ledger-1".to_string()))
            .expect("remembered");

        let connection = store.connection(&user).expect("lookup").expect("connected");
        assert_eq!(connection.ledger, Some(LedgerId("ledger-1".to_string())));
    }
}
