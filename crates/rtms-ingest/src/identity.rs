//! Record identity derivation
//!
//! The identity key joins the known fields of a record in [`KnownField::ALL`] order.
//! A missing field contributes an empty segment so every key has the same shape.
//! Two distinct transactions that agree on every known field share a key; that
//! collision is accepted and not disambiguated.

use std::fmt;

use crate::models::{KnownField, TransactionRecord};

/// Separator placed between key segments
pub const IDENTITY_DELIMITER: &str = "_";

/// Deduplication key for a [`TransactionRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordIdentity(String);

impl RecordIdentity {
    pub fn of(record: &TransactionRecord) -> Self {
        let segments: Vec<&str> = KnownField::ALL
            .into_iter()
            .map(|field| record.get(field).map(str::trim).unwrap_or(""))
            .collect();

        Self(segments.join(IDENTITY_DELIMITER))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
