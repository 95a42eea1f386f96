mod durable;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use durable::WalStore;
pub use memory::{InMemoryStore, SharedListing};

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("period not found: {0}")]
    NotFound(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    Wal(String),
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent home of a listing's periods. Reads must observe every write
/// that has returned `Ok`.
#[async_trait]
pub trait PeriodStore: Send + Sync {
    /// Periods of `kind` for `listing_id` within `tolerance_days` of
    /// `overlapping`, sorted by start.
    async fn query_periods(
        &self,
        listing_id: Ulid,
        kind: PeriodKind,
        overlapping: DateRange,
        tolerance_days: u32,
    ) -> Result<Vec<Period>, StoreError>;

    async fn insert_period(&self, period: NewPeriod) -> Result<Ulid, StoreError>;

    async fn delete_period(&self, id: Ulid) -> Result<(), StoreError>;

    /// Every period of `kind` for `listing_id`, sorted by start.
    async fn list_periods(&self, listing_id: Ulid, kind: PeriodKind) -> Result<Vec<Period>, StoreError>;
}
