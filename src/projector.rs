use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MAX_GAP_DAYS;
use crate::model::CalendarDate;

/// A confirmed stay, as the calendar sees it. Both dates are inclusive for
/// display purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub check_in: CalendarDate,
    pub check_out: CalendarDate,
    pub guest_name: Option<String>,
}

/// An inclusive run of days the calendar must not offer for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledRange {
    pub from: CalendarDate,
    pub to: CalendarDate,
}

impl DisabledRange {
    pub fn contains(&self, date: CalendarDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Project bookings onto the ranges they make unselectable: the stay itself
/// plus `gap_days` of buffer on each side. Output ranges may overlap.
pub fn project(bookings: &[Booking], gap_days: u32) -> Vec<DisabledRange> {
    let gap = i64::from(gap_days.min(MAX_GAP_DAYS));
    let mut out = Vec::with_capacity(bookings.len() * if gap > 0 { 3 } else { 1 });

    for booking in bookings {
        if gap > 0 {
            out.push(DisabledRange {
                from: booking.check_in.add_days(-gap),
                to: booking.check_in.pred(),
            });
            // Starts on check-out day itself.
            out.push(DisabledRange {
                from: booking.check_out,
                to: booking.check_out.add_days(gap - 1),
            });
        }
        out.push(DisabledRange {
            from: booking.check_in,
            to: booking.check_out,
        });
    }
    out
}
