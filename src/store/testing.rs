use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

use super::{InMemoryStore, PeriodStore, StoreError};

/// Wraps an [`InMemoryStore`] and fails every write once `writes_allowed`
/// writes have gone through. Reads never fail. Counts every call so tests can
/// assert a rejected edit never reached the store.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    writes_allowed: AtomicUsize,
    pub queries: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(writes_allowed: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            writes_allowed: AtomicUsize::new(writes_allowed),
            queries: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn reliable() -> Self {
        Self::new(usize::MAX)
    }

    pub fn fail_writes_after(&self, n: usize) {
        self.writes_allowed.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    fn take_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.writes_allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| StoreError::Unavailable("injected failure".into()))
    }
}

#[async_trait]
impl PeriodStore for FlakyStore {
    async fn query_periods(
        &self,
        listing_id: Ulid,
        kind: PeriodKind,
        overlapping: DateRange,
        tolerance_days: u32,
    ) -> Result<Vec<Period>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner
            .query_periods(listing_id, kind, overlapping, tolerance_days)
            .await
    }

    async fn insert_period(&self, period: NewPeriod) -> Result<Ulid, StoreError> {
        self.take_write()?;
        self.inner.insert_period(period).await
    }

    async fn delete_period(&self, id: Ulid) -> Result<(), StoreError> {
        self.take_write()?;
        self.inner.delete_period(id).await
    }

    async fn list_periods(&self, listing_id: Ulid, kind: PeriodKind) -> Result<Vec<Period>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.list_periods(listing_id, kind).await
    }
}
