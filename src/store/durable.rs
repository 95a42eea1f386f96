use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use super::{InMemoryStore, PeriodStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Period store backed by a write-ahead log.
///
/// A write is applied to memory only after the WAL reports it durable, and
/// before the call returns, so every read sees every acknowledged write.
pub struct WalStore {
    state: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold it shared; compaction holds it exclusively so no append
    /// can slip between the state snapshot and the log swap.
    /// Lock order: gate, then listing.
    gate: RwLock<()>,
}

impl WalStore {
    /// Replay the WAL at `path` and start the writer task. Must be called from
    /// within a Tokio runtime.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&path)?;

        let state = InMemoryStore::new();
        // Sole owner of these locks during replay, so try_write never contends.
        for event in &events {
            let listing = state.listing_or_insert(event.listing_id());
            if let Ok(mut guard) = listing.try_write() {
                state.apply_event(&mut guard, event);
            }
        }
        let live = state.period_count();
        let stale = events.len().saturating_sub(live) as u64;

        let mut wal = Wal::open(&path)?;
        wal.set_backlog(stale);
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        info!(
            path = %path.display(),
            events = events.len(),
            live_periods = live,
            listings = state.listing_count(),
            "period WAL replayed"
        );
        metrics::gauge!(crate::observability::LISTINGS_ACTIVE).set(state.listing_count() as f64);

        Ok(Self {
            state,
            wal_tx,
            gate: RwLock::new(()),
        })
    }

    pub fn state(&self) -> &InMemoryStore {
        &self.state
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// WAL-append + apply in one call.
    async fn persist_and_apply(&self, lp: &mut ListingPeriods, event: &Event) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        self.state.apply_event(lp, event);
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _exclusive = self.gate.write().await;
        let events = self.state.snapshot_events().await;
        let live = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))?;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(live_periods = live, "period WAL compacted");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Per-listing `(rate periods, open periods)` counts.
    pub async fn listing_summaries(&self) -> Vec<(Ulid, usize, usize)> {
        self.state.listing_summaries().await
    }
}

#[async_trait]
impl PeriodStore for WalStore {
    async fn query_periods(
        &self,
        listing_id: Ulid,
        kind: PeriodKind,
        overlapping: DateRange,
        tolerance_days: u32,
    ) -> Result<Vec<Period>, StoreError> {
        self.state
            .query_periods(listing_id, kind, overlapping, tolerance_days)
            .await
    }

    async fn insert_period(&self, period: NewPeriod) -> Result<Ulid, StoreError> {
        let _shared = self.gate.read().await;
        let is_new_listing = !self.state.contains_listing(&period.listing_id);
        let listing = self.state.listing_for_write(period.listing_id)?;
        let mut guard = listing.write().await;
        InMemoryStore::check_room(&guard, period.payload.kind())?;

        let id = Ulid::new();
        let event = Event::PeriodInserted {
            period: period.into_period(id, Utc::now()),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        if is_new_listing {
            metrics::gauge!(crate::observability::LISTINGS_ACTIVE)
                .set(self.state.listing_count() as f64);
        }
        Ok(id)
    }

    async fn delete_period(&self, id: Ulid) -> Result<(), StoreError> {
        let _shared = self.gate.read().await;
        let (listing_id, mut guard) = self.state.resolve_period_write(&id).await?;
        let event = Event::PeriodDeleted { id, listing_id };
        self.persist_and_apply(&mut guard, &event).await
    }

    async fn list_periods(&self, listing_id: Ulid, kind: PeriodKind) -> Result<Vec<Period>, StoreError> {
        self.state.list_periods(listing_id, kind).await
    }
}
