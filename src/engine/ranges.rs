use crate::model::{CalendarDate, DateRange};

/// Collapse a set of selected days into the minimal list of maximal contiguous
/// ranges, ascending. Duplicates are ignored.
pub fn build_ranges<I>(dates: I) -> Vec<DateRange>
where
    I: IntoIterator<Item = CalendarDate>,
{
    let mut sorted: Vec<CalendarDate> = dates.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<DateRange> = Vec::new();
    for date in sorted {
        if let Some(last) = ranges.last_mut()
            && date.days_since(last.end) <= 1
        {
            last.end = date;
            continue;
        }
        ranges.push(DateRange::single(date));
    }
    ranges
}
