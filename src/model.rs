use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::ValidationError;

/// A calendar day. Day granularity is the only time resolution the calendar has,
/// so two dates are equal iff they name the same day regardless of zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Local calendar day of a timestamp, as seen in the timestamp's own zone.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self(dt.date_naive())
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    pub fn add_days(self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    pub fn succ(self) -> Self {
        self.add_days(1)
    }

    pub fn pred(self) -> Self {
        self.add_days(-1)
    }

    /// Signed number of days from `earlier` to `self`.
    pub fn days_since(self, earlier: CalendarDate) -> i64 {
        (self.0 - earlier.0).num_days()
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for CalendarDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Self)
    }
}

/// Closed interval of days `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: CalendarDate,
    pub end: CalendarDate,
}

impl DateRange {
    pub fn new(start: CalendarDate, end: CalendarDate) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    pub fn single(date: CalendarDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn num_days(&self) -> i64 {
        self.end.days_since(self.start) + 1
    }

    pub fn contains_date(&self, date: CalendarDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Strict intersection: the two ranges share at least one day.
    pub fn intersects(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Grow the range by `days` on both sides.
    pub fn widen(&self, days: u32) -> DateRange {
        let d = i64::from(days);
        DateRange::new(self.start.add_days(-d), self.end.add_days(d))
    }

    /// Smallest range covering both.
    pub fn hull(&self, other: &DateRange) -> DateRange {
        DateRange::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn days(&self) -> impl Iterator<Item = CalendarDate> + use<> {
        let start = self.start;
        (0..self.num_days()).map(move |i| start.add_days(i))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Nightly rate override, `1..=32767`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Rate(u16);

impl Rate {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 32767;

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if value < i64::from(Self::MIN) || value > i64::from(Self::MAX) {
            return Err(ValidationError::RateOutOfRange(value));
        }
        Ok(Self(value as u16))
    }

    /// Parse operator input. Only a plain base-10 integer is accepted.
    pub fn parse_input(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ValidationError::InvalidRate(trimmed.to_string()))?;
        Self::new(value)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Rate {
    type Error = ValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<Rate> for u16 {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which period table a period lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    /// Custom nightly rate overrides.
    Rate,
    /// Availability windows.
    Open,
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKind::Rate => f.write_str("rate"),
            PeriodKind::Open => f.write_str("open"),
        }
    }
}

/// What a period carries. Equality here is the merge predicate: open payloads
/// are always equal to each other, rate payloads only when the rates match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    Rate(Rate),
    Open,
}

impl Payload {
    pub fn kind(&self) -> PeriodKind {
        match self {
            Payload::Rate(_) => PeriodKind::Rate,
            Payload::Open => PeriodKind::Open,
        }
    }

    pub fn rate(&self) -> Option<Rate> {
        match self {
            Payload::Rate(r) => Some(*r),
            Payload::Open => None,
        }
    }
}

/// A persisted period. Never mutated in place: edits are delete + insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub span: DateRange,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

impl Period {
    pub fn kind(&self) -> PeriodKind {
        self.payload.kind()
    }

    pub fn rate(&self) -> Option<Rate> {
        self.payload.rate()
    }
}

/// A period the engine wants inserted. The store assigns id and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPeriod {
    pub listing_id: Ulid,
    pub span: DateRange,
    pub payload: Payload,
}

impl NewPeriod {
    pub fn into_period(self, id: Ulid, created_at: DateTime<Utc>) -> Period {
        Period {
            id,
            listing_id: self.listing_id,
            span: self.span,
            payload: self.payload,
            created_at,
        }
    }
}

/// All periods of one listing, one sorted lane per kind.
#[derive(Debug, Clone)]
pub struct ListingPeriods {
    pub listing_id: Ulid,
    /// Rate periods, sorted by `span.start`.
    pub rates: Vec<Period>,
    /// Open periods, sorted by `span.start`.
    pub open: Vec<Period>,
}

impl ListingPeriods {
    pub fn new(listing_id: Ulid) -> Self {
        Self {
            listing_id,
            rates: Vec::new(),
            open: Vec::new(),
        }
    }

    pub fn periods(&self, kind: PeriodKind) -> &[Period] {
        match kind {
            PeriodKind::Rate => &self.rates,
            PeriodKind::Open => &self.open,
        }
    }

    fn lane_mut(&mut self, kind: PeriodKind) -> &mut Vec<Period> {
        match kind {
            PeriodKind::Rate => &mut self.rates,
            PeriodKind::Open => &mut self.open,
        }
    }

    pub fn len(&self, kind: PeriodKind) -> usize {
        self.periods(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty() && self.open.is_empty()
    }

    /// Insert period maintaining sort order by span.start.
    pub fn insert(&mut self, period: Period) {
        let lane = self.lane_mut(period.kind());
        let pos = lane
            .binary_search_by_key(&period.span.start, |p| p.span.start)
            .unwrap_or_else(|e| e);
        lane.insert(pos, period);
    }

    /// Remove period by id from whichever lane holds it.
    pub fn remove(&mut self, id: Ulid) -> Option<Period> {
        for kind in [PeriodKind::Rate, PeriodKind::Open] {
            let lane = self.lane_mut(kind);
            if let Some(pos) = lane.iter().position(|p| p.id == id) {
                return Some(lane.remove(pos));
            }
        }
        None
    }

    /// Periods of `kind` within `tolerance_days` of `query`.
    /// Uses binary search to skip periods starting after the widened window.
    pub fn overlapping(
        &self,
        kind: PeriodKind,
        query: &DateRange,
        tolerance_days: u32,
    ) -> impl Iterator<Item = &Period> {
        let window = query.widen(tolerance_days);
        let lane = self.periods(kind);
        let right_bound = lane.partition_point(|p| p.span.start <= window.end);
        lane[..right_bound]
            .iter()
            .filter(move |p| p.span.end >= window.start)
    }
}

/// WAL record. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PeriodInserted { period: Period },
    PeriodDeleted { id: Ulid, listing_id: Ulid },
}

impl Event {
    pub fn listing_id(&self) -> Ulid {
        match self {
            Event::PeriodInserted { period } => period.listing_id,
            Event::PeriodDeleted { listing_id, .. } => *listing_id,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn range_basics() {
        let r = range("2024-01-01", "2024-01-10");
        assert_eq!(r.num_days(), 10);
        assert!(r.contains_date(d("2024-01-01")));
        assert!(r.contains_date(d("2024-01-10")));
        assert!(!r.contains_date(d("2024-01-11"))); // closed, not beyond
        assert_eq!(DateRange::single(d("2024-03-01")).num_days(), 1);
    }

    #[test]
    fn range_intersection_is_closed() {
        let a = range("2024-01-01", "2024-01-05");
        let b = range("2024-01-05", "2024-01-08");
        let c = range("2024-01-06", "2024-01-08");
        assert!(a.intersects(&b)); // shared boundary day
        assert!(!a.intersects(&c)); // adjacent, not intersecting
    }

    #[test]
    fn range_contains_range() {
        let outer = range("2024-01-01", "2024-01-10");
        assert!(outer.contains_range(&range("2024-01-03", "2024-01-05")));
        assert!(outer.contains_range(&outer));
        assert!(!outer.contains_range(&range("2023-12-31", "2024-01-05")));
    }

    #[test]
    fn range_days_crosses_month_boundary() {
        let days: Vec<_> = range("2024-02-28", "2024-03-01").days().collect();
        assert_eq!(days, vec![d("2024-02-28"), d("2024-02-29"), d("2024-03-01")]);
    }

    #[test]
    fn date_from_datetime_uses_local_day() {
        let offset = chrono::FixedOffset::east_opt(10 * 3600).unwrap();
        // 23:30 UTC on Jan 1 is Jan 2 at UTC+10.
        let dt = offset.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
        assert_eq!(CalendarDate::from_datetime(&dt), d("2024-01-02"));
        assert_eq!(CalendarDate::from_datetime(&dt.with_timezone(&Utc)), d("2024-01-01"));
    }

    #[test]
    fn date_display_and_parse() {
        let date = d("2024-07-04");
        assert_eq!(date.to_string(), "2024-07-04");
        assert!("07/04/2024".parse::<CalendarDate>().is_err());
    }

    #[test]
    fn rate_bounds() {
        assert!(Rate::new(0).is_err());
        assert!(Rate::new(1).is_ok());
        assert!(Rate::new(32767).is_ok());
        assert!(Rate::new(32768).is_err());
        assert!(Rate::new(-5).is_err());
    }

    #[test]
    fn rate_parse_input() {
        assert_eq!(Rate::parse_input(" 120 ").unwrap().get(), 120);
        assert!(matches!(Rate::parse_input("abc"), Err(ValidationError::InvalidRate(_))));
        assert!(matches!(Rate::parse_input("12abc"), Err(ValidationError::InvalidRate(_))));
        assert!(matches!(Rate::parse_input(""), Err(ValidationError::InvalidRate(_))));
        assert!(matches!(Rate::parse_input("12.5"), Err(ValidationError::InvalidRate(_))));
        assert!(matches!(Rate::parse_input("0"), Err(ValidationError::RateOutOfRange(0))));
        assert!(matches!(
            Rate::parse_input("32768"),
            Err(ValidationError::RateOutOfRange(32768))
        ));
    }

    #[test]
    fn payload_equality_is_merge_predicate() {
        assert_eq!(Payload::Open, Payload::Open);
        assert_eq!(Payload::Rate(rate(80)), Payload::Rate(rate(80)));
        assert_ne!(Payload::Rate(rate(80)), Payload::Rate(rate(100)));
        assert_eq!(Payload::Open.kind(), PeriodKind::Open);
        assert_eq!(Payload::Rate(rate(1)).rate(), Some(rate(1)));
    }

    #[test]
    fn listing_lanes_are_sorted_and_separate() {
        let lid = Ulid::new();
        let mut lp = ListingPeriods::new(lid);
        lp.insert(period(lid, "2024-03-01", "2024-03-05", Payload::Rate(rate(50))));
        lp.insert(period(lid, "2024-01-01", "2024-01-05", Payload::Rate(rate(60))));
        lp.insert(period(lid, "2024-02-01", "2024-02-05", Payload::Open));
        assert_eq!(lp.len(PeriodKind::Rate), 2);
        assert_eq!(lp.len(PeriodKind::Open), 1);
        assert_eq!(lp.rates[0].span.start, d("2024-01-01"));
        assert_eq!(lp.rates[1].span.start, d("2024-03-01"));
    }

    #[test]
    fn listing_remove_from_either_lane() {
        let lid = Ulid::new();
        let mut lp = ListingPeriods::new(lid);
        let open = period(lid, "2024-02-01", "2024-02-05", Payload::Open);
        let open_id = open.id;
        lp.insert(open);
        assert!(lp.remove(Ulid::new()).is_none());
        assert_eq!(lp.remove(open_id).map(|p| p.id), Some(open_id));
        assert!(lp.is_empty());
    }

    #[test]
    fn overlapping_respects_tolerance() {
        let lid = Ulid::new();
        let mut lp = ListingPeriods::new(lid);
        lp.insert(period(lid, "2024-01-01", "2024-01-05", Payload::Open));
        lp.insert(period(lid, "2024-01-20", "2024-01-25", Payload::Open));

        let query = range("2024-01-06", "2024-01-10");
        assert_eq!(lp.overlapping(PeriodKind::Open, &query, 0).count(), 0);
        let touching: Vec<_> = lp.overlapping(PeriodKind::Open, &query, 1).collect();
        assert_eq!(touching.len(), 1);
        assert_eq!(touching[0].span, range("2024-01-01", "2024-01-05"));
        // Rate lane is empty even though the open lane matches.
        assert_eq!(lp.overlapping(PeriodKind::Rate, &query, 1).count(), 0);
    }

    #[test]
    fn overlapping_large_period_spanning_query() {
        let lid = Ulid::new();
        let mut lp = ListingPeriods::new(lid);
        lp.insert(period(lid, "2023-01-01", "2025-01-01", Payload::Rate(rate(90))));
        let hits: Vec<_> = lp
            .overlapping(PeriodKind::Rate, &range("2024-06-01", "2024-06-02"), 0)
            .collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let lid = Ulid::new();
        let event = Event::PeriodInserted {
            period: period(lid, "2024-01-01", "2024-01-05", Payload::Rate(rate(80))),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.listing_id(), lid);
    }
}
