use std::collections::BTreeSet;

use chrono::Datelike;

use crate::limits::*;
use crate::model::*;

use super::ValidationError;

pub(crate) fn validate_date(date: CalendarDate) -> Result<(), ValidationError> {
    let year = date.naive().year();
    if !(MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&year) {
        return Err(ValidationError::LimitExceeded("date out of range"));
    }
    Ok(())
}

pub(crate) fn validate_range(range: &DateRange) -> Result<(), ValidationError> {
    validate_date(range.start)?;
    validate_date(range.end)?;
    if range.start > range.end {
        return Err(ValidationError::LimitExceeded("range ends before it starts"));
    }
    if range.num_days() > MAX_RANGE_DAYS {
        return Err(ValidationError::LimitExceeded("range too wide"));
    }
    Ok(())
}

pub(crate) fn validate_selection(selected: &BTreeSet<CalendarDate>) -> Result<(), ValidationError> {
    if selected.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    if selected.len() > MAX_SELECTION_DATES {
        return Err(ValidationError::SelectionTooLarge(selected.len()));
    }
    for date in selected {
        validate_date(*date)?;
    }
    Ok(())
}
