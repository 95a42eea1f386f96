mod error;
mod overlap;
mod plan;
mod ranges;
mod validate;

pub use error::{EngineError, ValidationError};
pub use overlap::{overlaps, periods_overlap, ADJACENCY_TOLERANCE_DAYS};
pub use plan::{
    is_full_override, plan_close, plan_full_override, plan_open, plan_rate_edit, plan_reset,
    reconcile, remnants, should_merge, Diff, Fill,
};
pub use ranges::build_ranges;
pub(crate) use validate::validate_selection;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{self, operation_label};
use crate::store::{PeriodStore, StoreError};

use validate::validate_range;

/// A bulk calendar edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ApplyRate(Rate),
    ResetRate,
    Open,
    Close,
}

impl Operation {
    /// Which period table the operation edits.
    pub fn kind(&self) -> PeriodKind {
        match self {
            Operation::ApplyRate(_) | Operation::ResetRate => PeriodKind::Rate,
            Operation::Open | Operation::Close => PeriodKind::Open,
        }
    }
}

/// Totals for a completed bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub ranges: usize,
    pub deleted: usize,
    pub inserted: usize,
}

/// Runs reconciliation against an injected period store.
///
/// Each range goes query → plan → commit, and every store call is awaited
/// before the next, so later ranges observe earlier ranges' writes. Nothing
/// serializes two engines editing the same listing; concurrent sessions can
/// still race.
pub struct Engine<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: PeriodStore + ?Sized> Engine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply `op` to each range in order. A store failure stops the run; ranges
    /// already applied stay committed.
    pub async fn run(
        &self,
        listing_id: Ulid,
        ranges: &[DateRange],
        op: Operation,
    ) -> Result<BulkOutcome, EngineError> {
        let label = operation_label(&op);
        if ranges.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        for range in ranges {
            validate_range(range)?;
        }

        let started = Instant::now();
        let mut outcome = BulkOutcome::default();
        for (i, range) in ranges.iter().enumerate() {
            match self.plan_and_commit(listing_id, range, op).await {
                Ok(diff) => {
                    outcome.ranges += 1;
                    outcome.deleted += diff.to_delete.len();
                    outcome.inserted += diff.to_insert.len();
                    metrics::counter!(observability::RANGES_APPLIED_TOTAL, "operation" => label)
                        .increment(1);
                }
                Err(source) => {
                    error!(
                        %listing_id,
                        operation = label,
                        %range,
                        applied = i,
                        total = ranges.len(),
                        "store failure, aborting remaining ranges: {source}"
                    );
                    metrics::counter!(
                        observability::OPERATIONS_TOTAL,
                        "operation" => label,
                        "status" => "error"
                    )
                    .increment(1);
                    return Err(EngineError::PartiallyApplied {
                        applied: i,
                        total: ranges.len(),
                        failed_range: *range,
                        source,
                    });
                }
            }
        }

        metrics::counter!(observability::OPERATIONS_TOTAL, "operation" => label, "status" => "ok")
            .increment(1);
        metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "operation" => label)
            .record(started.elapsed().as_secs_f64());
        info!(
            %listing_id,
            operation = label,
            ranges = outcome.ranges,
            deleted = outcome.deleted,
            inserted = outcome.inserted,
            "bulk operation committed"
        );
        Ok(outcome)
    }

    pub async fn apply_rate(&self, listing_id: Ulid, range: &DateRange, rate: Rate) -> Result<Diff, EngineError> {
        self.apply_one(listing_id, range, Operation::ApplyRate(rate)).await
    }

    pub async fn reset_rate(&self, listing_id: Ulid, range: &DateRange) -> Result<Diff, EngineError> {
        self.apply_one(listing_id, range, Operation::ResetRate).await
    }

    pub async fn open(&self, listing_id: Ulid, range: &DateRange) -> Result<Diff, EngineError> {
        self.apply_one(listing_id, range, Operation::Open).await
    }

    pub async fn close(&self, listing_id: Ulid, range: &DateRange) -> Result<Diff, EngineError> {
        self.apply_one(listing_id, range, Operation::Close).await
    }

    async fn apply_one(&self, listing_id: Ulid, range: &DateRange, op: Operation) -> Result<Diff, EngineError> {
        validate_range(range)?;
        Ok(self.plan_and_commit(listing_id, range, op).await?)
    }

    /// Query, compute the diff for one range, and commit it.
    async fn plan_and_commit(
        &self,
        listing_id: Ulid,
        range: &DateRange,
        op: Operation,
    ) -> Result<Diff, StoreError> {
        let diff = self.plan(listing_id, range, op).await?;
        self.commit(&diff).await?;
        info!(
            %listing_id,
            operation = operation_label(&op),
            %range,
            deleted = diff.to_delete.len(),
            inserted = diff.to_insert.len(),
            "range reconciled"
        );
        Ok(diff)
    }

    async fn plan(&self, listing_id: Ulid, range: &DateRange, op: Operation) -> Result<Diff, StoreError> {
        let kind = op.kind();
        match op {
            Operation::ApplyRate(rate) => {
                let nearby = self.store.query_periods(listing_id, kind, *range, 0).await?;
                let extended = self
                    .store
                    .query_periods(listing_id, kind, *range, ADJACENCY_TOLERANCE_DAYS)
                    .await?;
                // A full override still yields to a touching same-rate neighbour:
                // adjacent equal-rate periods are never left split.
                if is_full_override(range, &nearby)
                    && !should_merge(range, Payload::Rate(rate), &extended)
                {
                    debug!(%listing_id, %range, nearby = nearby.len(), "full override");
                    return Ok(plan_full_override(listing_id, range, rate, &nearby));
                }
                Ok(plan_rate_edit(listing_id, range, rate, &extended))
            }
            Operation::ResetRate => {
                let overlapping = self.store.query_periods(listing_id, kind, *range, 0).await?;
                Ok(plan_reset(listing_id, range, &overlapping))
            }
            Operation::Open => {
                let overlapping = self
                    .store
                    .query_periods(listing_id, kind, *range, ADJACENCY_TOLERANCE_DAYS)
                    .await?;
                Ok(plan_open(listing_id, range, &overlapping))
            }
            Operation::Close => {
                let overlapping = self.store.query_periods(listing_id, kind, *range, 0).await?;
                Ok(plan_close(listing_id, range, &overlapping))
            }
        }
    }

    /// Deletes first, then inserts, each awaited. No rollback on failure.
    async fn commit(&self, diff: &Diff) -> Result<(), StoreError> {
        for id in &diff.to_delete {
            debug!(%id, "deleting period");
            self.store.delete_period(*id).await?;
        }
        for period in &diff.to_insert {
            let id = self.store.insert_period(*period).await?;
            debug!(%id, span = %period.span, payload = ?period.payload, "inserted period");
        }
        metrics::counter!(observability::PERIODS_DELETED_TOTAL).increment(diff.to_delete.len() as u64);
        metrics::counter!(observability::PERIODS_INSERTED_TOTAL).increment(diff.to_insert.len() as u64);
        Ok(())
    }
}
