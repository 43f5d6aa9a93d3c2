//! Ingestion pipeline orchestrator
//!
//! Drives enumeration, fetching, reconciliation and writing month by month:
//!
//! ```text
//! Idle -> EnumeratingWork -> FetchingUnit -> ParsingBatch -> Reconciling -> Writing -> Done
//!                                 ^                                            |
//!                                 +------------------ next month --------------+
//! ```
//!
//! Unit failures are counted and never leave the run. A write failure marks its month
//! failed and the run moves on to the next month; only a snapshot load failure aborts.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rtms_common::YearMonth;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::enumerator::WorkPlan;
use crate::error::{ApiErrorClass, FetchError, IngestError, Result};
use crate::fetcher::TransactionSource;
use crate::identity::RecordIdentity;
use crate::models::{TransactionRecord, WorkUnit};
use crate::reconcile::{ReconciliationEngine, StoreSnapshot};
use crate::store::{StoreWriter, TabularStore};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    EnumeratingWork,
    FetchingUnit,
    ParsingBatch,
    Reconciling,
    Writing,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::EnumeratingWork => "enumerating_work",
            PipelineState::FetchingUnit => "fetching_unit",
            PipelineState::ParsingBatch => "parsing_batch",
            PipelineState::Reconciling => "reconciling",
            PipelineState::Writing => "writing",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Counters for one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthReport {
    pub month: YearMonth,
    pub units: usize,
    pub fetched: usize,
    pub duplicates: usize,
    /// Records written (or, in a dry run, that would have been written)
    pub added: usize,
    pub failed_units: usize,
    pub write_error: Option<String>,
}

impl MonthReport {
    fn new(month: YearMonth, units: usize) -> Self {
        Self {
            month,
            units,
            fetched: 0,
            duplicates: 0,
            added: 0,
            failed_units: 0,
            write_error: None,
        }
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub months: Vec<MonthReport>,
}

impl RunReport {
    fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            months: Vec::new(),
        }
    }

    fn sum(&self, field: impl Fn(&MonthReport) -> usize) -> usize {
        self.months.iter().map(field).sum()
    }

    pub fn units(&self) -> usize {
        self.sum(|m| m.units)
    }

    pub fn fetched(&self) -> usize {
        self.sum(|m| m.fetched)
    }

    pub fn duplicates(&self) -> usize {
        self.sum(|m| m.duplicates)
    }

    pub fn added(&self) -> usize {
        self.sum(|m| m.added)
    }

    pub fn failed_units(&self) -> usize {
        self.sum(|m| m.failed_units)
    }

    /// Months whose append failed
    pub fn failed_months(&self) -> Vec<YearMonth> {
        self.months
            .iter()
            .filter(|m| m.write_error.is_some())
            .map(|m| m.month)
            .collect()
    }

    pub fn has_write_failures(&self) -> bool {
        self.months.iter().any(|m| m.write_error.is_some())
    }

    pub fn summary(&self) -> String {
        format!(
            "{}units={} fetched={} duplicates={} added={} failed_units={} failed_months={}",
            if self.dry_run { "[dry run] " } else { "" },
            self.units(),
            self.fetched(),
            self.duplicates(),
            self.added(),
            self.failed_units(),
            self.failed_months().len()
        )
    }
}

/// Pipeline over a record source and a store
pub struct IngestPipeline<F, S> {
    source: F,
    writer: StoreWriter<S>,
    engine: ReconciliationEngine,
    concurrency: usize,
    dry_run: bool,
    state: PipelineState,
}

impl<F, S> IngestPipeline<F, S>
where
    F: TransactionSource,
    S: TabularStore,
{
    pub fn new(source: F, store: S) -> Self {
        Self {
            source,
            writer: StoreWriter::new(store),
            engine: ReconciliationEngine,
            concurrency: 1,
            dry_run: false,
            state: PipelineState::Idle,
        }
    }

    /// Units fetched at once within a month; 1 keeps one request in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn store(&self) -> &S {
        self.writer.store()
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "Pipeline state");
        self.state = next;
    }

    /// Execute every unit of `plan`
    pub async fn run(&mut self, plan: &WorkPlan) -> Result<RunReport> {
        let mut report = RunReport::new(self.dry_run);
        self.transition(PipelineState::EnumeratingWork);

        info!(
            run_id = %report.run_id,
            months = plan.months.len(),
            regions = plan.regions.len(),
            units = plan.len(),
            concurrency = self.concurrency,
            dry_run = self.dry_run,
            "Starting ingestion run"
        );

        let mut snapshot =
            self.writer
                .load_snapshot()
                .await
                .map_err(|source| IngestError::SnapshotLoad {
                    store: self.writer.store().describe(),
                    source,
                })?;

        for month in &plan.months {
            let month_report = self.run_month(*month, plan, &mut snapshot).await;
            info!(
                month = %month_report.month,
                fetched = month_report.fetched,
                duplicates = month_report.duplicates,
                added = month_report.added,
                failed_units = month_report.failed_units,
                write_failed = month_report.write_error.is_some(),
                "Month complete"
            );
            report.months.push(month_report);
        }

        self.transition(PipelineState::Done);
        report.finished_at = Some(Utc::now());
        info!(run_id = %report.run_id, "{}", report.summary());
        Ok(report)
    }

    async fn run_month(
        &mut self,
        month: YearMonth,
        plan: &WorkPlan,
        snapshot: &mut StoreSnapshot,
    ) -> MonthReport {
        let units = plan.units_for(month);
        let mut report = MonthReport::new(month, units.len());

        self.transition(PipelineState::FetchingUnit);
        let source = &self.source;
        let results: Vec<(&WorkUnit, std::result::Result<Vec<TransactionRecord>, FetchError>)> =
            stream::iter(units.iter())
                .map(|unit| async move { (unit, source.fetch(unit).await) })
                .buffered(self.concurrency)
                .collect()
                .await;

        self.transition(PipelineState::ParsingBatch);
        let mut batch = Vec::new();
        for (unit, result) in results {
            match result {
                Ok(records) => {
                    report.fetched += records.len();
                    batch.extend(records);
                },
                Err(e) => {
                    log_unit_failure(unit, &e);
                    report.failed_units += 1;
                },
            }
        }

        self.transition(PipelineState::Reconciling);
        let reconciled = self.engine.reconcile(batch, snapshot);
        report.duplicates = reconciled.duplicates;

        self.transition(PipelineState::Writing);
        if self.dry_run {
            report.added = reconciled.new_records.len();
            info!(%month, would_add = report.added, "Dry run: skipping append");
            return report;
        }

        match self.writer.append(&reconciled.new_records).await {
            Ok(written) => report.added = written,
            Err(source) => {
                // Nothing from this month reached the store
                for record in &reconciled.new_records {
                    snapshot.remove(&RecordIdentity::of(record));
                }
                let err = IngestError::Write {
                    month,
                    store: self.writer.store().describe(),
                    source,
                };
                error!(%month, records = reconciled.new_records.len(), error = %err, "Write failed");
                report.write_error = Some(err.to_string());
            },
        }

        report
    }
}

fn log_unit_failure(unit: &WorkUnit, err: &FetchError) {
    let (region, month) = (&unit.region, &unit.month);
    match err {
        FetchError::Api {
            class: ApiErrorClass::Credential,
            ..
        } => error!(%region, %month, error = %err, "Credential rejected by upstream"),
        FetchError::Api { .. } => warn!(%region, %month, error = %err, "Unknown API error"),
        FetchError::Transport { .. } => warn!(%region, %month, error = %err, "Giving up on unit"),
        FetchError::MalformedPayload(_) => {
            warn!(%region, %month, error = %err, "Malformed response payload")
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn month(raw: &str) -> YearMonth {
        YearMonth::parse(raw).unwrap()
    }

    #[test]
    fn test_report_totals_and_summary() {
        let mut report = RunReport::new(false);
        let mut january = MonthReport::new(month("202501"), 3);
        january.fetched = 10;
        january.duplicates = 4;
        january.added = 6;
        let mut february = MonthReport::new(month("202502"), 3);
        february.fetched = 2;
        february.failed_units = 1;
        february.write_error = Some("store rejected the request".to_string());
        report.months = vec![january, february];

        assert_eq!(report.units(), 6);
        assert_eq!(report.fetched(), 12);
        assert_eq!(report.added(), 6);
        assert_eq!(report.failed_months(), vec![month("202502")]);
        assert!(report.has_write_failures());
        assert_eq!(
            report.summary(),
            "units=6 fetched=12 duplicates=4 added=6 failed_units=1 failed_months=1"
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::EnumeratingWork.to_string(), "enumerating_work");
        assert_eq!(PipelineState::Done.to_string(), "done");
    }
}
