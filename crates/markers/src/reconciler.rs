use std::collections::{BTreeMap, BTreeSet};

use clustering::composition::analyze_or_none;
use clustering::index::{ClusterFeature, ClusterId, Feature, SpatialIndex};
use clustering::model::{Pinory, PinoryId};
use foundation::bounds::LngLat;
use runtime::event_bus::{Event, EventBus};
use serde::Serialize;

use crate::renderable::{ClusterBadge, MarkerContent, MarkerHandle, MarkerKey, MarkerProps};
use crate::session::{MapError, MapSession, MapSurface, MarkerView, Pool, PoolToken, SessionError};

/// Hard cap for the zoom a cluster click flies to.
pub const MAX_EXPANSION_ZOOM: u8 = 20;
/// Images sampled from a cluster's leaves for its badge.
pub const MAX_CLUSTER_IMAGES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub max_cluster_images: usize,
    pub max_expansion_zoom: u8,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_cluster_images: MAX_CLUSTER_IMAGES,
            max_expansion_zoom: MAX_EXPANSION_ZOOM,
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    /// Point markers destroyed and created again because selection changed.
    pub recreated: usize,
    pub removed: usize,
    pub retained: usize,
    /// Creation stopped early because the map went away.
    pub aborted: bool,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.recreated == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerEvent {
    Created(MarkerKey),
    Destroyed(MarkerKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    FlyTo { center: LngLat, zoom: u8 },
    Selected(PinoryId),
    Ignored,
}

pub type SelectionHandler = Box<dyn FnMut(&Pinory)>;

#[derive(Debug)]
enum Target {
    Cluster { id: ClusterId, center: LngLat },
    Point { index: usize, id: PinoryId },
}

#[derive(Debug)]
struct TrackedMarker {
    handle: MarkerHandle,
    target: Target,
    selected: bool,
}

/// Keeps the cluster and note markers of one pool in line with the latest
/// viewport query result.
///
/// Ordering contract:
/// - Features are processed in query order; stale markers are removed after
///   all features, in key order.
/// - At most one marker exists per key at any time.
pub struct MarkerReconciler {
    token: PoolToken,
    config: ReconcilerConfig,
    markers: BTreeMap<MarkerKey, TrackedMarker>,
    events: EventBus<MarkerEvent>,
    on_select: Option<SelectionHandler>,
}

impl MarkerReconciler {
    pub fn new(token: PoolToken, config: ReconcilerConfig) -> Self {
        Self {
            token,
            config,
            markers: BTreeMap::new(),
            events: EventBus::new(),
            on_select: None,
        }
    }

    pub fn with_selection_handler(mut self, handler: impl FnMut(&Pinory) + 'static) -> Self {
        self.on_select = Some(Box::new(handler));
        self
    }

    pub fn token(&self) -> &PoolToken {
        &self.token
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn contains(&self, key: &MarkerKey) -> bool {
        self.markers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &MarkerKey> {
        self.markers.keys()
    }

    /// Cached selection flag of a note marker.
    pub fn is_selected(&self, key: &MarkerKey) -> Option<bool> {
        self.markers.get(key).map(|m| m.selected)
    }

    pub fn events(&self) -> &[Event<MarkerEvent>] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<Event<MarkerEvent>> {
        self.events.drain()
    }

    /// Runs one reconciliation pass against `features`.
    ///
    /// Skipped entirely while the map is not ready. Never panics on map
    /// failures: a detached map stops further creations for this pass and
    /// the markers created so far stay valid.
    pub fn reconcile<M: MapSurface, V: MarkerView>(
        &mut self,
        session: &mut MapSession<M, V>,
        features: &[Feature],
        index: &SpatialIndex,
        selected: Option<&str>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if !session.is_ready() {
            tracing::debug!("map not ready, skipping reconcile");
            return report;
        }

        let pass = self.events.begin_pass();
        let current: BTreeSet<MarkerKey> = features.iter().filter_map(|f| key_of(f, index)).collect();
        let mut pool = session.pool(&self.token);

        for feature in features {
            if report.aborted {
                break;
            }
            match feature {
                Feature::Cluster(cluster) => {
                    let key = MarkerKey::Cluster(cluster.id);
                    if self.markers.contains_key(&key) {
                        report.retained += 1;
                        continue;
                    }
                    let props = self.cluster_props(index, cluster);
                    match pool.create(props) {
                        Ok(handle) => {
                            self.markers.insert(
                                key.clone(),
                                TrackedMarker {
                                    handle,
                                    target: Target::Cluster {
                                        id: cluster.id,
                                        center: cluster.center,
                                    },
                                    selected: false,
                                },
                            );
                            self.events.emit(MarkerEvent::Created(key));
                            report.created += 1;
                        }
                        Err(err) => on_create_error(&key, err, &mut report),
                    }
                }
                Feature::Point(point) => {
                    let Some(pinory) = index.pinory(point.index) else {
                        continue;
                    };
                    let key = MarkerKey::Note(pinory.id.clone());
                    let is_selected = selected == Some(pinory.id.as_str());

                    let mut replaced = false;
                    if let Some(existing) = self.markers.get(&key) {
                        if existing.selected == is_selected {
                            report.retained += 1;
                            continue;
                        }
                        if let Some(old) = self.markers.remove(&key) {
                            if !destroy_tracked(&mut pool, &mut self.events, &mut self.markers, key.clone(), old) {
                                continue;
                            }
                            replaced = true;
                        }
                    }

                    match pool.create(MarkerProps::pin(pinory, is_selected)) {
                        Ok(handle) => {
                            self.markers.insert(
                                key.clone(),
                                TrackedMarker {
                                    handle,
                                    target: Target::Point {
                                        index: point.index,
                                        id: pinory.id.clone(),
                                    },
                                    selected: is_selected,
                                },
                            );
                            self.events.emit(MarkerEvent::Created(key));
                            if replaced {
                                report.recreated += 1;
                            } else {
                                report.created += 1;
                            }
                        }
                        Err(err) => on_create_error(&key, err, &mut report),
                    }
                }
            }
        }

        let stale: Vec<MarkerKey> = self
            .markers
            .keys()
            .filter(|k| !current.contains(*k))
            .cloned()
            .collect();
        for key in stale {
            if let Some(old) = self.markers.remove(&key)
                && destroy_tracked(&mut pool, &mut self.events, &mut self.markers, key, old)
            {
                report.removed += 1;
            }
        }

        tracing::debug!(
            pass,
            created = report.created,
            recreated = report.recreated,
            removed = report.removed,
            retained = report.retained,
            aborted = report.aborted,
            "reconciled markers"
        );
        report
    }

    /// Destroys every tracked marker. Returns how many were destroyed.
    pub fn teardown<M: MapSurface, V: MarkerView>(&mut self, session: &mut MapSession<M, V>) -> usize {
        let mut pool = session.pool(&self.token);
        let markers = std::mem::take(&mut self.markers);
        let mut count = 0;
        for (key, tracked) in markers {
            if destroy_tracked(&mut pool, &mut self.events, &mut self.markers, key, tracked) {
                count += 1;
            }
        }
        count
    }

    /// Cluster markers fly to their expansion zoom (capped); note markers
    /// invoke the selection handler.
    pub fn click<M: MapSurface, V: MarkerView>(
        &mut self,
        key: &MarkerKey,
        session: &mut MapSession<M, V>,
        index: &SpatialIndex,
    ) -> ClickOutcome {
        let Some(tracked) = self.markers.get(key) else {
            return ClickOutcome::Ignored;
        };

        match &tracked.target {
            Target::Cluster { id, center } => {
                let expansion = match index.expansion_zoom(*id) {
                    Ok(z) => z,
                    Err(err) => {
                        tracing::warn!(%key, error = %err, "cluster expansion failed");
                        return ClickOutcome::Ignored;
                    }
                };
                let zoom = expansion.min(self.config.max_expansion_zoom);
                if let Err(err) = session.fly_to(*center, zoom as f64) {
                    tracing::warn!(%key, error = %err, "fly-to failed");
                    return ClickOutcome::Ignored;
                }
                ClickOutcome::FlyTo {
                    center: *center,
                    zoom,
                }
            }
            Target::Point { index: i, id } => {
                let pinory = index
                    .pinory(*i)
                    .filter(|p| &p.id == id)
                    .or_else(|| index.pinories().iter().find(|p| &p.id == id));
                let Some(pinory) = pinory else {
                    return ClickOutcome::Ignored;
                };
                if let Some(handler) = self.on_select.as_mut() {
                    handler(pinory);
                }
                ClickOutcome::Selected(pinory.id.clone())
            }
        }
    }

    fn cluster_props(&self, index: &SpatialIndex, cluster: &ClusterFeature) -> MarkerProps {
        let composition = analyze_or_none(index, cluster.id);
        let images = match index.leaves(cluster.id, self.config.max_cluster_images, 0) {
            Ok(leaves) => leaves
                .iter()
                .filter_map(|p| p.primary_image())
                .map(str::to_string)
                .collect(),
            Err(err) => {
                tracing::debug!(cluster_id = cluster.id, error = %err, "no image samples");
                Vec::new()
            }
        };

        MarkerProps {
            position: cluster.center,
            content: MarkerContent::ClusterBadge(ClusterBadge {
                cluster_id: cluster.id,
                point_count: cluster.point_count,
                composition,
                images,
            }),
        }
    }
}

fn key_of(feature: &Feature, index: &SpatialIndex) -> Option<MarkerKey> {
    match feature {
        Feature::Cluster(c) => Some(MarkerKey::Cluster(c.id)),
        Feature::Point(p) => index.pinory(p.index).map(|pinory| MarkerKey::Note(pinory.id.clone())),
    }
}

fn on_create_error(key: &MarkerKey, err: MapError, report: &mut ReconcileReport) {
    match err {
        MapError::Detached => {
            tracing::warn!(%key, "map detached during reconcile, aborting remaining creations");
            report.aborted = true;
        }
        other => tracing::warn!(%key, error = %other, "failed to create marker"),
    }
}

// Returns `false` if the pool refused the handle; the marker is then tracked
// again under `key` so it is never orphaned.
fn destroy_tracked<M: MapSurface, V: MarkerView>(
    pool: &mut Pool<'_, M, V>,
    events: &mut EventBus<MarkerEvent>,
    markers: &mut BTreeMap<MarkerKey, TrackedMarker>,
    key: MarkerKey,
    tracked: TrackedMarker,
) -> bool {
    let TrackedMarker {
        handle,
        target,
        selected,
    } = tracked;
    match pool.destroy(handle) {
        Ok(()) => {
            events.emit(MarkerEvent::Destroyed(key));
            true
        }
        Err(SessionError::ForeignHandle(handle)) => {
            tracing::warn!(%key, "marker belongs to another pool, keeping it tracked");
            markers.insert(
                key,
                TrackedMarker {
                    handle,
                    target,
                    selected,
                },
            );
            false
        }
        Err(err) => {
            tracing::warn!(%key, error = %err, "failed to destroy marker");
            false
        }
    }
}
