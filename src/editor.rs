use std::sync::Arc;

use tracing::{error, warn};
use ulid::Ulid;

use crate::calendar::{CalendarSnapshot, CalendarSurface};
use crate::engine::{
    build_ranges, validate_selection, BulkOutcome, Engine, EngineError, Operation, ValidationError,
};
use crate::model::Rate;
use crate::observability;
use crate::store::PeriodStore;

/// Connects one listing's calendar surface to the engine: reads the
/// selection, validates input, runs the edit, then refreshes the surface.
pub struct CalendarEditor<S: ?Sized> {
    engine: Engine<S>,
    listing_id: Ulid,
}

impl<S: PeriodStore + ?Sized> CalendarEditor<S> {
    pub fn new(store: Arc<S>, listing_id: Ulid) -> Self {
        Self {
            engine: Engine::new(store),
            listing_id,
        }
    }

    pub fn listing_id(&self) -> Ulid {
        self.listing_id
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// Set a custom nightly rate over the selected dates. `input` is the raw
    /// text from the rate field.
    pub async fn apply_rate<C: CalendarSurface + ?Sized>(
        &self,
        surface: &mut C,
        input: &str,
    ) -> Result<BulkOutcome, EngineError> {
        let rate = Rate::parse_input(input);
        self.execute(surface, "apply_rate", move || rate.map(Operation::ApplyRate))
            .await
    }

    /// Revert the selected dates to the base rate.
    pub async fn reset_rates<C: CalendarSurface + ?Sized>(
        &self,
        surface: &mut C,
    ) -> Result<BulkOutcome, EngineError> {
        self.execute(surface, "reset_rate", || Ok(Operation::ResetRate)).await
    }

    pub async fn open_dates<C: CalendarSurface + ?Sized>(
        &self,
        surface: &mut C,
    ) -> Result<BulkOutcome, EngineError> {
        self.execute(surface, "open", || Ok(Operation::Open)).await
    }

    pub async fn close_dates<C: CalendarSurface + ?Sized>(
        &self,
        surface: &mut C,
    ) -> Result<BulkOutcome, EngineError> {
        self.execute(surface, "close", || Ok(Operation::Close)).await
    }

    /// Selection is checked before the operation's own input, and neither
    /// check touches the store.
    async fn execute<C, F>(&self, surface: &mut C, label: &'static str, op: F) -> Result<BulkOutcome, EngineError>
    where
        C: CalendarSurface + ?Sized,
        F: FnOnce() -> Result<Operation, ValidationError>,
    {
        let selected = surface.selected_dates();
        let op = match validate_selection(&selected).and_then(|()| op()) {
            Ok(op) => op,
            Err(e) => {
                warn!(listing_id = %self.listing_id, operation = label, "edit rejected: {e}");
                metrics::counter!(observability::VALIDATION_REJECTIONS_TOTAL, "operation" => label)
                    .increment(1);
                return Err(e.into());
            }
        };

        let ranges = build_ranges(selected);
        let outcome = self.engine.run(self.listing_id, &ranges, op).await?;
        self.refresh(surface).await?;
        Ok(outcome)
    }

    /// Re-read both period kinds and push them to the surface.
    pub async fn refresh<C: CalendarSurface + ?Sized>(&self, surface: &mut C) -> Result<(), EngineError> {
        let snapshot = CalendarSnapshot::load(self.engine.store().as_ref(), self.listing_id)
            .await
            .inspect_err(|e| {
                error!(listing_id = %self.listing_id, "calendar refresh failed: {e}");
            })?;
        surface.set_config(snapshot);
        surface.clear();
        surface.redraw();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use crate::model::*;
    use crate::store::testing::FlakyStore;
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct RecordingSurface {
        selected: BTreeSet<CalendarDate>,
        calls: Vec<&'static str>,
        config: Option<CalendarSnapshot>,
    }

    impl RecordingSurface {
        fn selecting(dates: &[&str]) -> Self {
            Self {
                selected: dates.iter().map(|s| d(s)).collect(),
                ..Default::default()
            }
        }
    }

    impl CalendarSurface for RecordingSurface {
        fn selected_dates(&self) -> BTreeSet<CalendarDate> {
            self.selected.clone()
        }

        fn set_config(&mut self, snapshot: CalendarSnapshot) {
            self.calls.push("set_config");
            self.config = Some(snapshot);
        }

        fn clear(&mut self) {
            self.calls.push("clear");
            self.selected.clear();
        }

        fn redraw(&mut self) {
            self.calls.push("redraw");
        }
    }

    fn editor(store: &Arc<FlakyStore>) -> CalendarEditor<FlakyStore> {
        CalendarEditor::new(store.clone(), Ulid::new())
    }

    #[tokio::test]
    async fn apply_rate_refreshes_surface_in_order() {
        let store = Arc::new(FlakyStore::reliable());
        let editor = editor(&store);
        let mut surface =
            RecordingSurface::selecting(&["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-07"]);

        let outcome = editor.apply_rate(&mut surface, "150").await.unwrap();
        assert_eq!(outcome.ranges, 2);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(surface.calls, vec!["set_config", "clear", "redraw"]);
        assert!(surface.selected.is_empty());

        let config = surface.config.unwrap();
        let spans: Vec<_> = config.rates.iter().map(|p| p.span).collect();
        assert_eq!(
            spans,
            vec![range("2024-01-01", "2024-01-03"), range("2024-01-07", "2024-01-07")]
        );
        assert!(config.rates.iter().all(|p| p.rate() == Some(rate(150))));
    }

    #[tokio::test]
    async fn bad_rate_never_reaches_store() {
        for input in ["0", "32768", "abc", "", "-3", "12abc"] {
            let store = Arc::new(FlakyStore::reliable());
            let editor = editor(&store);
            let mut surface = RecordingSurface::selecting(&["2024-01-01"]);

            let err = editor.apply_rate(&mut surface, input).await.unwrap_err();
            assert!(err.is_validation(), "{input:?} should be rejected");
            assert_eq!(store.calls(), 0, "{input:?} touched the store");
            assert!(surface.calls.is_empty());
            assert_eq!(surface.selected.len(), 1);
        }
    }

    #[tokio::test]
    async fn empty_selection_rejected_for_every_operation() {
        let store = Arc::new(FlakyStore::reliable());
        let editor = editor(&store);
        let mut surface = RecordingSurface::default();

        let results = [
            editor.apply_rate(&mut surface, "100").await,
            editor.reset_rates(&mut surface).await,
            editor.open_dates(&mut surface).await,
            editor.close_dates(&mut surface).await,
        ];
        for result in results {
            assert!(matches!(
                result,
                Err(EngineError::Validation(ValidationError::EmptySelection))
            ));
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn empty_selection_wins_over_bad_rate() {
        let store = Arc::new(FlakyStore::reliable());
        let mut surface = RecordingSurface::default();
        let err = editor(&store).apply_rate(&mut surface, "nope").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::EmptySelection)));
    }

    #[tokio::test]
    async fn open_then_close_middle() {
        let store = Arc::new(FlakyStore::reliable());
        let editor = editor(&store);

        let mut surface = RecordingSurface {
            selected: range("2024-03-01", "2024-03-10").days().collect(),
            ..Default::default()
        };
        editor.open_dates(&mut surface).await.unwrap();

        let mut surface = RecordingSurface::selecting(&["2024-03-04", "2024-03-05"]);
        editor.close_dates(&mut surface).await.unwrap();

        let open: Vec<_> = surface.config.unwrap().open_periods.iter().map(|p| p.span).collect();
        assert_eq!(
            open,
            vec![range("2024-03-01", "2024-03-03"), range("2024-03-06", "2024-03-10")]
        );
    }

    #[tokio::test]
    async fn store_failure_skips_refresh() {
        let store = Arc::new(FlakyStore::reliable());
        let editor = editor(&store);
        store.fail_writes_after(1);
        let mut surface = RecordingSurface::selecting(&["2024-01-01", "2024-01-05"]);

        let err = editor.open_dates(&mut surface).await.unwrap_err();
        assert!(matches!(err, EngineError::PartiallyApplied { applied: 1, total: 2, .. }));
        assert!(surface.calls.is_empty());
        assert_eq!(surface.selected.len(), 2);
    }

    #[tokio::test]
    async fn reset_reverts_selection_only() {
        let store = Arc::new(FlakyStore::reliable());
        let editor = editor(&store);

        let mut surface = RecordingSurface {
            selected: range("2024-01-01", "2024-01-10").days().collect(),
            ..Default::default()
        };
        editor.apply_rate(&mut surface, "80").await.unwrap();

        let mut surface = RecordingSurface::selecting(&["2024-01-05"]);
        let outcome = editor.reset_rates(&mut surface).await.unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.inserted, 2);
        let config = surface.config.unwrap();
        assert_eq!(config.rate_on(d("2024-01-05")), None);
        assert_eq!(config.rate_on(d("2024-01-04")), Some(rate(80)));
        assert_eq!(config.rate_on(d("2024-01-06")), Some(rate(80)));
    }
}
