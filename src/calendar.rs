use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::*;
use crate::projector::{self, Booking, DisabledRange};
use crate::store::{PeriodStore, StoreError};

/// Immutable view of a listing's periods, re-read after every committed edit
/// and handed to the surface by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    /// Rate periods, sorted by start, pairwise non-overlapping.
    pub rates: Vec<Period>,
    /// Open periods, sorted by start, pairwise non-overlapping.
    pub open_periods: Vec<Period>,
}

impl CalendarSnapshot {
    pub async fn load<S: PeriodStore + ?Sized>(store: &S, listing_id: Ulid) -> Result<Self, StoreError> {
        Ok(Self {
            rates: store.list_periods(listing_id, PeriodKind::Rate).await?,
            open_periods: store.list_periods(listing_id, PeriodKind::Open).await?,
        })
    }

    /// Custom rate in effect on `date`, if any.
    pub fn rate_on(&self, date: CalendarDate) -> Option<Rate> {
        covering(&self.rates, date).and_then(Period::rate)
    }

    pub fn is_open(&self, date: CalendarDate) -> bool {
        covering(&self.open_periods, date).is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// The period in a sorted, non-overlapping lane that covers `date`.
fn covering(lane: &[Period], date: CalendarDate) -> Option<&Period> {
    let idx = lane.partition_point(|p| p.span.start <= date);
    let candidate = lane[..idx].last()?;
    candidate.span.contains_date(date).then_some(candidate)
}

/// The date picker the operator edits through.
pub trait CalendarSurface {
    /// Dates currently selected by the operator.
    fn selected_dates(&self) -> BTreeSet<CalendarDate>;
    fn set_config(&mut self, snapshot: CalendarSnapshot);
    /// Clears the selection along with any transient marks.
    fn clear(&mut self);
    fn redraw(&mut self);
}

/// Per-listing display settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSettings {
    /// Nightly rate shown where no custom rate applies.
    pub base_rate: Option<Rate>,
    /// Days blocked before and after each booking.
    pub gap_days: u32,
}

/// Where a day's displayed rate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRate {
    Custom(Rate),
    Base(Rate),
    Unset,
}

impl DayRate {
    pub fn value(&self) -> Option<Rate> {
        match self {
            DayRate::Custom(r) | DayRate::Base(r) => Some(*r),
            DayRate::Unset => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayView {
    pub date: CalendarDate,
    pub rate: DayRate,
    /// Inside an open period. Days outside every open period render blocked.
    pub open: bool,
    /// Before the view's reference day.
    pub past: bool,
    pub booking: Option<Ulid>,
    /// Check-in day of the booking; the strip starts here.
    pub booking_start: bool,
    /// Check-out day of the booking.
    pub booking_end: bool,
    /// Guest label, shown on the check-in day only.
    pub guest_name: Option<String>,
    /// Past, or covered by a booking or its gap buffer; not selectable.
    pub disabled: bool,
}

/// Resolves what each calendar day shows.
pub struct CalendarView {
    snapshot: CalendarSnapshot,
    settings: ListingSettings,
    bookings: Vec<Booking>,
    blocked: Vec<DisabledRange>,
    today: Option<CalendarDate>,
}

impl CalendarView {
    pub fn new(snapshot: CalendarSnapshot, settings: ListingSettings, bookings: Vec<Booking>) -> Self {
        let blocked = projector::project(&bookings, settings.gap_days);
        Self {
            snapshot,
            settings,
            bookings,
            blocked,
            today: None,
        }
    }

    /// Treat days before `today` as past. Without it no day is past.
    pub fn as_of(mut self, today: CalendarDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn snapshot(&self) -> &CalendarSnapshot {
        &self.snapshot
    }

    pub fn day(&self, date: CalendarDate) -> DayView {
        let rate = match (self.snapshot.rate_on(date), self.settings.base_rate) {
            (Some(custom), _) => DayRate::Custom(custom),
            (None, Some(base)) => DayRate::Base(base),
            (None, None) => DayRate::Unset,
        };
        let past = self.today.is_some_and(|today| date < today);
        let booking = self
            .bookings
            .iter()
            .find(|b| b.check_in <= date && date <= b.check_out);
        // A turnover day is one stay's check-out and the next one's check-in.
        let arriving = self.bookings.iter().find(|b| b.check_in == date);
        DayView {
            date,
            rate,
            open: self.snapshot.is_open(date),
            past,
            booking: booking.map(|b| b.id),
            booking_start: arriving.is_some(),
            booking_end: self.bookings.iter().any(|b| b.check_out == date),
            guest_name: arriving.and_then(|b| b.guest_name.clone()),
            disabled: past || self.blocked.iter().any(|r| r.contains(date)),
        }
    }

    pub fn days(&self, range: DateRange) -> impl Iterator<Item = DayView> + '_ {
        range.days().map(|date| self.day(date))
    }
}
