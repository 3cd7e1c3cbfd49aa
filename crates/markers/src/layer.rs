use std::sync::Arc;

use clustering::index::{ClusterOptions, Feature, IndexAdapter};
use clustering::model::{Pinory, PinoryId};
use clustering::viewport::ViewportQuery;

use runtime::event_bus::Event;

use crate::reconciler::{ClickOutcome, MarkerEvent, MarkerReconciler, ReconcileReport, ReconcilerConfig};
use crate::renderable::MarkerKey;
use crate::session::{MapSession, MapSurface, MarkerView, SessionError};
use crate::tracker::ViewportState;

/// The clustered pinory layer: index, viewport memo and reconciler wired
/// together over one marker pool.
pub struct PinoryLayer {
    adapter: IndexAdapter,
    viewport: ViewportQuery,
    reconciler: MarkerReconciler,
    selected: Option<PinoryId>,
}

impl PinoryLayer {
    pub const POOL: &'static str = "pinories";

    pub fn attach<M: MapSurface, V: MarkerView>(
        session: &mut MapSession<M, V>,
        options: ClusterOptions,
        config: ReconcilerConfig,
    ) -> Result<Self, SessionError> {
        let token = session.claim_pool(Self::POOL)?;
        Ok(Self {
            adapter: IndexAdapter::new(options),
            viewport: ViewportQuery::new(),
            reconciler: MarkerReconciler::new(token, config),
            selected: None,
        })
    }

    /// Returns `true` if the dataset changed and the index was rebuilt.
    pub fn set_pinories(&mut self, pinories: &Arc<Vec<Pinory>>) -> bool {
        self.adapter.sync(pinories)
    }

    pub fn select(&mut self, id: Option<PinoryId>) {
        self.selected = id;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn adapter(&self) -> &IndexAdapter {
        &self.adapter
    }

    pub fn reconciler(&self) -> &MarkerReconciler {
        &self.reconciler
    }

    /// Marker events of the latest render.
    pub fn drain_events(&mut self) -> Vec<Event<MarkerEvent>> {
        self.reconciler.drain_events()
    }

    /// Features for `state`, memoized per integer zoom.
    pub fn features(&mut self, state: Option<&ViewportState>) -> Arc<[Feature]> {
        self.viewport.query(
            state.map(|s| &s.bounds),
            state.map_or(0.0, |s| s.zoom),
            self.adapter.index(),
        )
    }

    pub fn render<M: MapSurface, V: MarkerView>(
        &mut self,
        session: &mut MapSession<M, V>,
        state: Option<&ViewportState>,
    ) -> ReconcileReport {
        let features = self.features(state);
        let Some(index) = self.adapter.index() else {
            return ReconcileReport::default();
        };
        self.reconciler
            .reconcile(session, &features, index, self.selected.as_deref())
    }

    /// Forwards a marker click. Selecting a pin makes it the selected
    /// pinory for the next render.
    pub fn click<M: MapSurface, V: MarkerView>(
        &mut self,
        key: &MarkerKey,
        session: &mut MapSession<M, V>,
    ) -> ClickOutcome {
        let Some(index) = self.adapter.index() else {
            return ClickOutcome::Ignored;
        };
        let outcome = self.reconciler.click(key, session, index);
        if let ClickOutcome::Selected(id) = &outcome {
            self.selected = Some(id.clone());
        }
        outcome
    }

    pub fn teardown<M: MapSurface, V: MarkerView>(&mut self, session: &mut MapSession<M, V>) -> usize {
        self.reconciler.teardown(session)
    }
}
