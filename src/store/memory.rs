use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{PeriodStore, StoreError};

pub type SharedListing = Arc<RwLock<ListingPeriods>>;

/// Period state held in memory: one lock per listing plus a period → listing
/// index so deletes by id need no scan.
pub struct InMemoryStore {
    listings: DashMap<Ulid, SharedListing>,
    period_to_listing: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            listings: DashMap::new(),
            period_to_listing: DashMap::new(),
        }
    }

    // ── Listings ─────────────────────────────────────────────

    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }

    pub fn contains_listing(&self, id: &Ulid) -> bool {
        self.listings.contains_key(id)
    }

    pub fn get_listing(&self, id: &Ulid) -> Option<SharedListing> {
        self.listings.get(id).map(|e| e.value().clone())
    }

    /// Live periods across every listing and kind.
    pub fn period_count(&self) -> usize {
        self.period_to_listing.len()
    }

    /// Get or create the listing's state. Replay uses this directly; writers go
    /// through [`Self::listing_for_write`] which enforces the listing limit.
    pub(crate) fn listing_or_insert(&self, id: Ulid) -> SharedListing {
        self.listings
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(ListingPeriods::new(id))))
            .value()
            .clone()
    }

    pub(crate) fn listing_for_write(&self, id: Ulid) -> Result<SharedListing, StoreError> {
        if let Some(existing) = self.get_listing(&id) {
            return Ok(existing);
        }
        if self.listings.len() >= MAX_LISTINGS {
            return Err(StoreError::LimitExceeded("too many listings"));
        }
        Ok(self.listing_or_insert(id))
    }

    // ── Period index ─────────────────────────────────────────

    pub fn get_listing_for_period(&self, period_id: &Ulid) -> Option<Ulid> {
        self.period_to_listing.get(period_id).map(|e| *e.value())
    }

    /// Lookup period → listing, acquire that listing's write lock.
    pub(crate) async fn resolve_period_write(
        &self,
        period_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<ListingPeriods>), StoreError> {
        let listing_id = self
            .get_listing_for_period(period_id)
            .ok_or(StoreError::NotFound(*period_id))?;
        let listing = self
            .get_listing(&listing_id)
            .ok_or(StoreError::NotFound(*period_id))?;
        let guard = listing.write_owned().await;
        // Deleted while we waited for the lock.
        if !guard.periods(PeriodKind::Rate).iter().any(|p| p.id == *period_id)
            && !guard.periods(PeriodKind::Open).iter().any(|p| p.id == *period_id)
        {
            return Err(StoreError::NotFound(*period_id));
        }
        Ok((listing_id, guard))
    }

    pub(crate) fn check_room(lp: &ListingPeriods, kind: PeriodKind) -> Result<(), StoreError> {
        if lp.len(kind) >= MAX_PERIODS_PER_LISTING {
            return Err(StoreError::LimitExceeded("too many periods on listing"));
        }
        Ok(())
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event to a listing (caller holds the lock).
    pub fn apply_event(&self, lp: &mut ListingPeriods, event: &Event) {
        match event {
            Event::PeriodInserted { period } => {
                self.period_to_listing.insert(period.id, period.listing_id);
                lp.insert(period.clone());
            }
            Event::PeriodDeleted { id, .. } => {
                lp.remove(*id);
                self.period_to_listing.remove(id);
            }
        }
    }

    /// One `PeriodInserted` per live period: the minimal event log that
    /// recreates the current state.
    pub async fn snapshot_events(&self) -> Vec<Event> {
        let listings: Vec<SharedListing> = self.listings.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        for listing in listings {
            let guard = listing.read().await;
            for kind in [PeriodKind::Rate, PeriodKind::Open] {
                events.extend(
                    guard
                        .periods(kind)
                        .iter()
                        .map(|p| Event::PeriodInserted { period: p.clone() }),
                );
            }
        }
        events
    }

    /// Per-listing `(rate periods, open periods)` counts.
    pub async fn listing_summaries(&self) -> Vec<(Ulid, usize, usize)> {
        let listings: Vec<SharedListing> = self.listings.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(listings.len());
        for listing in listings {
            let guard = listing.read().await;
            out.push((
                guard.listing_id,
                guard.len(PeriodKind::Rate),
                guard.len(PeriodKind::Open),
            ));
        }
        out.sort_by_key(|(id, _, _)| *id);
        out
    }
}

#[async_trait]
impl PeriodStore for InMemoryStore {
    async fn query_periods(
        &self,
        listing_id: Ulid,
        kind: PeriodKind,
        overlapping: DateRange,
        tolerance_days: u32,
    ) -> Result<Vec<Period>, StoreError> {
        let Some(listing) = self.get_listing(&listing_id) else {
            return Ok(Vec::new());
        };
        let guard = listing.read().await;
        Ok(guard
            .overlapping(kind, &overlapping, tolerance_days)
            .cloned()
            .collect())
    }

    async fn insert_period(&self, period: NewPeriod) -> Result<Ulid, StoreError> {
        let listing = self.listing_for_write(period.listing_id)?;
        let mut guard = listing.write().await;
        Self::check_room(&guard, period.payload.kind())?;
        let id = Ulid::new();
        let event = Event::PeriodInserted {
            period: period.into_period(id, Utc::now()),
        };
        self.apply_event(&mut guard, &event);
        Ok(id)
    }

    async fn delete_period(&self, id: Ulid) -> Result<(), StoreError> {
        let (listing_id, mut guard) = self.resolve_period_write(&id).await?;
        self.apply_event(&mut guard, &Event::PeriodDeleted { id, listing_id });
        Ok(())
    }

    async fn list_periods(&self, listing_id: Ulid, kind: PeriodKind) -> Result<Vec<Period>, StoreError> {
        let Some(listing) = self.get_listing(&listing_id) else {
            return Ok(Vec::new());
        };
        let guard = listing.read().await;
        Ok(guard.periods(kind).to_vec())
    }
}
