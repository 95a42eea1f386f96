use ulid::Ulid;

use crate::model::*;

use super::overlap::{overlaps, ADJACENCY_TOLERANCE_DAYS};

// ── Reconciliation planning ──────────────────────────────────────

/// The store writes one edit needs: deletes first, then inserts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub to_delete: Vec<Ulid>,
    pub to_insert: Vec<NewPeriod>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }

    fn delete(&mut self, id: Ulid) {
        if !self.to_delete.contains(&id) {
            self.to_delete.push(id);
        }
    }
}

/// What to put over the target range once existing periods are trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Leave the range empty (reset-rate, close).
    Nothing,
    /// Insert exactly the range; every overlapping period is trimmed.
    Replace(Payload),
    /// Fold payload-equal periods within adjacency tolerance into one period
    /// spanning their union with the range; all others are trimmed.
    Merge(Payload),
}

/// Parts of `period` outside `range`: a "before" piece ending the day before
/// `range.start`, and an "after" piece starting the day after `range.end`.
/// Strict comparisons mean no zero-length piece is ever produced.
pub fn remnants(period: &Period, range: &DateRange) -> impl Iterator<Item = NewPeriod> + use<> {
    let before = (period.span.start < range.start).then(|| NewPeriod {
        listing_id: period.listing_id,
        span: DateRange::new(period.span.start, range.start.pred()),
        payload: period.payload,
    });
    let after = (period.span.end > range.end).then(|| NewPeriod {
        listing_id: period.listing_id,
        span: DateRange::new(range.end.succ(), period.span.end),
        payload: period.payload,
    });
    before.into_iter().chain(after)
}

/// The single trim-and-reinsert primitive every operation is built from.
///
/// Candidates that do not intersect `range` (and are not merge partners) are
/// left alone, so callers may pass a tolerance-widened query result.
pub fn reconcile(listing_id: Ulid, range: &DateRange, fill: Fill, candidates: &[Period]) -> Diff {
    let mut diff = Diff::default();
    let mut target = *range;
    let merge_with = match fill {
        Fill::Merge(payload) => Some(payload),
        _ => None,
    };

    for period in candidates {
        let mergeable = merge_with.is_some_and(|payload| {
            period.payload == payload
                && overlaps(&period.span, range, ADJACENCY_TOLERANCE_DAYS)
        });
        if mergeable {
            target = target.hull(&period.span);
            diff.delete(period.id);
            continue;
        }
        if !period.span.intersects(range) {
            continue;
        }
        diff.delete(period.id);
        diff.to_insert.extend(remnants(period, range));
    }

    match fill {
        Fill::Nothing => {}
        Fill::Replace(payload) => diff.to_insert.push(NewPeriod {
            listing_id,
            span: *range,
            payload,
        }),
        Fill::Merge(payload) => diff.to_insert.push(NewPeriod {
            listing_id,
            span: target,
            payload,
        }),
    }

    elide_noops(&mut diff, candidates);
    diff
}

/// Drop delete+insert pairs that would recreate an identical period.
fn elide_noops(diff: &mut Diff, candidates: &[Period]) {
    let mut kept = Vec::with_capacity(diff.to_insert.len());
    for insert in diff.to_insert.drain(..) {
        let same = candidates.iter().find(|p| {
            p.span == insert.span && p.payload == insert.payload && diff.to_delete.contains(&p.id)
        });
        match same {
            Some(p) => diff.to_delete.retain(|id| *id != p.id),
            None => kept.push(insert),
        }
    }
    diff.to_insert = kept;
}

/// Every nearby period lies inside `range` (vacuously true when none do).
pub fn is_full_override(range: &DateRange, nearby: &[Period]) -> bool {
    nearby.iter().all(|p| range.contains_range(&p.span))
}

/// Some payload-equal period overlaps `range` or touches it.
pub fn should_merge(range: &DateRange, payload: Payload, extended: &[Period]) -> bool {
    extended
        .iter()
        .any(|p| p.payload == payload && overlaps(&p.span, range, ADJACENCY_TOLERANCE_DAYS))
}

// ── Per-operation plans ──────────────────────────────────────────

/// apply-rate when the new period strictly dominates everything it touches.
pub fn plan_full_override(listing_id: Ulid, range: &DateRange, rate: Rate, nearby: &[Period]) -> Diff {
    reconcile(listing_id, range, Fill::Replace(Payload::Rate(rate)), nearby)
}

/// apply-rate over a partial overlap: merge with same-rate neighbours if any,
/// otherwise split the different-rate periods around the new one.
pub fn plan_rate_edit(listing_id: Ulid, range: &DateRange, rate: Rate, extended: &[Period]) -> Diff {
    let payload = Payload::Rate(rate);
    let fill = if should_merge(range, payload, extended) {
        Fill::Merge(payload)
    } else {
        Fill::Replace(payload)
    };
    reconcile(listing_id, range, fill, extended)
}

/// reset-rate: strip overrides from the range, keeping outside remnants.
pub fn plan_reset(listing_id: Ulid, range: &DateRange, overlapping: &[Period]) -> Diff {
    reconcile(listing_id, range, Fill::Nothing, overlapping)
}

/// open: merge unconditionally with every open period within tolerance.
pub fn plan_open(listing_id: Ulid, range: &DateRange, overlapping: &[Period]) -> Diff {
    reconcile(listing_id, range, Fill::Merge(Payload::Open), overlapping)
}

/// close: cut the range out of every open period it touches.
pub fn plan_close(listing_id: Ulid, range: &DateRange, overlapping: &[Period]) -> Diff {
    reconcile(listing_id, range, Fill::Nothing, overlapping)
}
