use thiserror::Error;

use crate::model::DateRange;
use crate::store::StoreError;

/// Input rejected before any store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no dates selected")]
    EmptySelection,
    #[error("Please enter a valid rate between 1 and 32767 (got {0:?})")]
    InvalidRate(String),
    #[error("Please enter a valid rate between 1 and 32767 (got {0})")]
    RateOutOfRange(i64),
    #[error("selection too large: {0} dates")]
    SelectionTooLarge(usize),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A bulk operation stopped at `failed_range`; the `applied` ranges before
    /// it stay committed.
    #[error("aborted at range {failed_range} after {applied} of {total} ranges: {source}")]
    PartiallyApplied {
        applied: usize,
        total: usize,
        failed_range: DateRange,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}
