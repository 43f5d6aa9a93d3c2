//! Local CSV file store
//!
//! A missing file is an empty store. Appends open the file in append mode and never
//! rewrite existing rows. File I/O runs on the blocking pool.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{StoreError, TabularStore, Table};

/// Byte-order mark some spreadsheet tools prepend to exported CSV files
const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone)]
pub struct CsvFileStore {
    path: PathBuf,
}

impl CsvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_table_sync(path: &Path) -> Result<Table, StoreError> {
        if !path.exists() {
            return Ok(Table::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if let Some(first) = rows.first_mut().and_then(|row| row.first_mut()) {
            if first.starts_with(UTF8_BOM) {
                *first = first.trim_start_matches(UTF8_BOM).to_string();
            }
        }

        Ok(Table::from_rows(rows))
    }

    fn append_rows_sync(path: &Path, rows: &[Vec<String>]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        // Keep the first appended row off a final line that lacks its terminator
        let len = file.metadata()?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Io(std::io::Error::other(e))
}

#[async_trait]
impl TabularStore for CsvFileStore {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn read_table(&self) -> Result<Table, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_table_sync(&path))
            .await
            .map_err(join_error)?
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::append_rows_sync(&path, &rows))
            .await
            .map_err(join_error)?
    }
}
