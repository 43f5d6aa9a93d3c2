//! Reconciliation of fetched batches against the store
//!
//! The snapshot is loaded once per run and grows as records are classified new, so a
//! later month in the same run never re-admits a record an earlier month already wrote.

use std::collections::HashSet;

use crate::identity::RecordIdentity;
use crate::models::TransactionRecord;

/// Identities already present in the store
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    identities: HashSet<RecordIdentity>,
}

impl StoreSnapshot {
    /// Returns `false` if the identity was already present
    pub fn insert(&mut self, identity: RecordIdentity) -> bool {
        self.identities.insert(identity)
    }

    pub fn remove(&mut self, identity: &RecordIdentity) -> bool {
        self.identities.remove(identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl Extend<RecordIdentity> for StoreSnapshot {
    fn extend<T: IntoIterator<Item = RecordIdentity>>(&mut self, iter: T) {
        self.identities.extend(iter);
    }
}

impl FromIterator<RecordIdentity> for StoreSnapshot {
    fn from_iter<T: IntoIterator<Item = RecordIdentity>>(iter: T) -> Self {
        Self {
            identities: iter.into_iter().collect(),
        }
    }
}

/// Outcome of reconciling one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Records absent from the snapshot, in batch order
    pub new_records: Vec<TransactionRecord>,
    /// Records whose identity was already known, including repeats within the batch
    pub duplicates: usize,
}

/// Splits batches into duplicates and net-new records
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    /// Classify every record of `batch` and add the identities of new ones to `snapshot`
    ///
    /// When two records in the batch share an identity only the first is new.
    pub fn reconcile(
        &self,
        batch: Vec<TransactionRecord>,
        snapshot: &mut StoreSnapshot,
    ) -> Reconciliation {
        let mut result = Reconciliation {
            new_records: Vec::with_capacity(batch.len()),
            duplicates: 0,
        };

        for record in batch {
            if snapshot.insert(RecordIdentity::of(&record)) {
                result.new_records.push(record);
            } else {
                result.duplicates += 1;
            }
        }

        result
    }
}
