use crate::model::{DateRange, Period};

/// Day distance within which two periods count as touching for merge purposes.
pub const ADJACENCY_TOLERANCE_DAYS: u32 = 1;

/// True if the closed ranges intersect, or if the gap between them (in either
/// order) is at most `tolerance_days`. With a tolerance of 0 this is plain
/// intersection; with 1, `[01, 05]` and `[06, 10]` overlap.
pub fn overlaps(a: &DateRange, b: &DateRange, tolerance_days: u32) -> bool {
    let t = i64::from(tolerance_days);
    a.start.days_since(b.end) <= t && b.start.days_since(a.end) <= t
}

pub fn periods_overlap(a: &Period, b: &Period, tolerance_days: u32) -> bool {
    overlaps(&a.span, &b.span, tolerance_days)
}
