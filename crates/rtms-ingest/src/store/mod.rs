//! Tabular store backends
//!
//! A store is an append-only table: the first row is a header naming the columns and every
//! following row is a record in header order. Backends implement [`TabularStore`];
//! [`StoreWriter`] layers snapshot loading and header projection on top of any of them.

pub mod csv_file;
pub mod sheets;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::identity::RecordIdentity;
use crate::models::{KnownField, TransactionRecord};
use crate::reconcile::StoreSnapshot;

pub use csv_file::CsvFileStore;
pub use sheets::SheetsStore;

/// Failure reading from or appending to a store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Full contents of a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Column names, trimmed; empty when the store has no header row yet
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Split raw rows into a trimmed header and data rows
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let header = rows
            .remove(0)
            .into_iter()
            .map(|name| name.trim().to_string())
            .collect();
        Self { header, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.header.iter().all(|name| name.is_empty())
    }

    /// Rebuild records from the data rows
    ///
    /// Short rows are padded with empty values; cells beyond the header are ignored.
    pub fn records(&self) -> impl Iterator<Item = TransactionRecord> + '_ {
        self.rows.iter().map(move |row| {
            TransactionRecord::from_fields(self.header.iter().enumerate().map(|(i, name)| {
                (name.as_str(), row.get(i).map(String::as_str).unwrap_or(""))
            }))
        })
    }
}

/// Backend holding the accumulated records
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Human-readable location, used in logs and errors
    fn describe(&self) -> String;

    /// Read the header and every data row
    async fn read_table(&self) -> Result<Table, StoreError>;

    /// Append rows after the last existing row, in one operation
    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: TabularStore + ?Sized> TabularStore for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn read_table(&self) -> Result<Table, StoreError> {
        (**self).read_table().await
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        (**self).append_rows(rows).await
    }
}

/// Open the backend named by the configuration
pub fn open_store(
    config: &StoreConfig,
    timeout: Duration,
) -> Result<Box<dyn TabularStore>, StoreError> {
    let store: Box<dyn TabularStore> = match config {
        StoreConfig::Csv { path } => Box::new(CsvFileStore::new(path.clone())),
        StoreConfig::Sheets {
            spreadsheet_id,
            range,
            access_token,
            api_base_url,
        } => Box::new(SheetsStore::new(
            api_base_url,
            spreadsheet_id.clone(),
            range.clone(),
            access_token.clone(),
            timeout,
        )?),
    };
    Ok(store)
}

/// Appends records to a store in the store's own column order
pub struct StoreWriter<S> {
    store: S,
    /// Header as last read or written; `None` until the snapshot is loaded
    header: Option<Vec<String>>,
}

impl<S: TabularStore> StoreWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            header: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the store once and collect the identities already present
    pub async fn load_snapshot(&mut self) -> Result<StoreSnapshot, StoreError> {
        let table = self.store.read_table().await?;

        let mut snapshot = StoreSnapshot::default();
        for record in table.records() {
            snapshot.insert(RecordIdentity::of(&record));
        }

        info!(
            store = %self.store.describe(),
            columns = table.header.len(),
            rows = table.rows.len(),
            identities = snapshot.len(),
            "Loaded existing store"
        );

        self.header = if table.is_empty() {
            Some(Vec::new())
        } else {
            Some(table.header)
        };
        Ok(snapshot)
    }

    /// Append records and return how many rows were written
    ///
    /// An empty store first receives a header built from the records' columns, written
    /// together with the rows. Otherwise each record is projected onto the existing header:
    /// missing columns become empty strings and columns the header lacks are dropped.
    pub async fn append(&mut self, records: &[TransactionRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let header = match self.header.take() {
            Some(header) => header,
            None => self.store.read_table().await?.header,
        };

        let (header, mut rows, header_is_new) = if header.iter().all(String::is_empty) {
            let header = header_for(records);
            (header, Vec::with_capacity(records.len() + 1), true)
        } else {
            (header, Vec::with_capacity(records.len()), false)
        };

        if header_is_new {
            rows.push(header.clone());
        }
        rows.extend(records.iter().map(|record| project(record, &header)));

        let written = records.len();
        let result = self.store.append_rows(rows).await;

        // A header write that failed leaves the store empty
        self.header = match (&result, header_is_new) {
            (Err(_), true) => Some(Vec::new()),
            _ => Some(header),
        };
        result?;

        debug!(store = %self.store.describe(), rows = written, header_is_new, "Appended rows");
        Ok(written)
    }
}

/// Union of the records' columns in first-seen order
///
/// Known fields are written under their canonical names, so alias duplicates collapse.
pub fn header_for(records: &[TransactionRecord]) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    for column in records.iter().flat_map(TransactionRecord::columns) {
        if !header.contains(&column) {
            header.push(column);
        }
    }
    header
}

/// Values of `record` laid out in `header` order
pub fn project(record: &TransactionRecord, header: &[String]) -> Vec<String> {
    let mut used_known: Vec<KnownField> = Vec::new();
    header
        .iter()
        .map(|column| {
            // A known field is emitted once even if the header names it under two aliases
            if let Some(field) = KnownField::from_tag(column) {
                if used_known.contains(&field) {
                    return String::new();
                }
                used_known.push(field);
            }
            record.value_for_column(column).unwrap_or("").to_string()
        })
        .collect()
}
