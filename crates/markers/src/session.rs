use std::collections::{BTreeMap, BTreeSet};

use foundation::bounds::{GeoBounds, LngLat};
use runtime::readiness::{Readiness, ReadySignal};

use crate::renderable::{MarkerContent, MarkerHandle, MarkerId, MarkerProps, PoolId, ViewId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// The renderer has not fired its load event yet.
    NotReady,
    /// The map instance went away mid-operation.
    Detached,
    Renderer(String),
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::NotReady => write!(f, "map is not loaded yet"),
            MapError::Detached => write!(f, "map instance is detached"),
            MapError::Renderer(msg) => write!(f, "renderer error: {msg}"),
        }
    }
}

impl std::error::Error for MapError {}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    PoolTaken(String),
    /// The handle belongs to another pool; it is returned untouched.
    ForeignHandle(MarkerHandle),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::PoolTaken(name) => write!(f, "marker pool already claimed: {name}"),
            SessionError::ForeignHandle(h) => {
                write!(f, "marker {} belongs to another pool", h.marker())
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// The map renderer as seen by the marker core.
pub trait MapSurface {
    fn is_loaded(&self) -> bool;
    fn bounds(&self) -> Result<GeoBounds, MapError>;
    fn zoom(&self) -> Result<f64, MapError>;
    fn add_marker(&mut self, at: LngLat) -> Result<MarkerId, MapError>;
    fn remove_marker(&mut self, marker: MarkerId);
    fn fly_to(&mut self, center: LngLat, zoom: f64) -> Result<(), MapError>;
}

/// The UI runtime that renders marker contents into marker elements.
pub trait MarkerView {
    fn mount(&mut self, marker: MarkerId, content: &MarkerContent) -> Result<ViewId, MapError>;
    fn unmount(&mut self, view: ViewId);
}

/// Exclusive right to mutate one named marker pool.
#[derive(Debug)]
pub struct PoolToken {
    id: PoolId,
    name: String,
}

impl PoolToken {
    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Default)]
struct PoolEntry {
    name: String,
    live: BTreeSet<MarkerId>,
}

/// Owns the renderer, the UI runtime and the registry of marker pools.
///
/// Subsystems claim a pool once and can only create and destroy markers
/// through it.
#[derive(Debug)]
pub struct MapSession<M, V> {
    map: M,
    view: V,
    pools: BTreeMap<PoolId, PoolEntry>,
    next_pool: u32,
    readiness: Readiness,
}

impl<M: MapSurface, V: MarkerView> MapSession<M, V> {
    pub fn new(map: M, view: V) -> Self {
        let readiness = Readiness::new();
        if map.is_loaded() {
            readiness.mark_ready();
        }
        Self {
            map,
            view,
            pools: BTreeMap::new(),
            next_pool: 0,
            readiness,
        }
    }

    pub fn claim_pool(&mut self, name: &str) -> Result<PoolToken, SessionError> {
        if self.pools.values().any(|p| p.name == name) {
            return Err(SessionError::PoolTaken(name.to_string()));
        }
        let id = PoolId(self.next_pool);
        self.next_pool += 1;
        self.pools.insert(
            id,
            PoolEntry {
                name: name.to_string(),
                live: BTreeSet::new(),
            },
        );
        tracing::debug!(pool = name, "claimed marker pool");
        Ok(PoolToken {
            id,
            name: name.to_string(),
        })
    }

    pub fn pool(&mut self, token: &PoolToken) -> Pool<'_, M, V> {
        Pool {
            session: self,
            id: token.id,
        }
    }

    /// Live marker count of a pool.
    pub fn pool_len(&self, token: &PoolToken) -> usize {
        self.pools.get(&token.id).map_or(0, |p| p.live.len())
    }

    /// Called when the renderer fires its load event.
    pub fn mark_loaded(&self) {
        self.readiness.mark_ready();
    }

    /// Resolves once `mark_loaded` has been called.
    pub fn readiness(&self) -> ReadySignal {
        self.readiness.signal()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready() && self.map.is_loaded()
    }

    pub fn bounds(&self) -> Result<GeoBounds, MapError> {
        self.map.bounds()
    }

    pub fn zoom(&self) -> Result<f64, MapError> {
        self.map.zoom()
    }

    pub fn fly_to(&mut self, center: LngLat, zoom: f64) -> Result<(), MapError> {
        self.map.fly_to(center, zoom)
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn view(&self) -> &V {
        &self.view
    }
}

/// Marker creation and destruction restricted to one pool.
pub struct Pool<'a, M, V> {
    session: &'a mut MapSession<M, V>,
    id: PoolId,
}

impl<M: MapSurface, V: MarkerView> Pool<'_, M, V> {
    /// Adds the marker and mounts its view. If mounting fails the marker is
    /// removed again before the error is returned.
    pub fn create(&mut self, props: MarkerProps) -> Result<MarkerHandle, MapError> {
        let marker = self.session.map.add_marker(props.position)?;
        let view = match self.session.view.mount(marker, &props.content) {
            Ok(view) => view,
            Err(err) => {
                self.session.map.remove_marker(marker);
                return Err(err);
            }
        };

        if let Some(entry) = self.session.pools.get_mut(&self.id) {
            entry.live.insert(marker);
        }
        Ok(MarkerHandle {
            pool: self.id,
            marker,
            view,
        })
    }

    /// Unmounts the view, then removes the marker.
    pub fn destroy(&mut self, handle: MarkerHandle) -> Result<(), SessionError> {
        if handle.pool != self.id {
            return Err(SessionError::ForeignHandle(handle));
        }
        self.session.view.unmount(handle.view);
        self.session.map.remove_marker(handle.marker);
        if let Some(entry) = self.session.pools.get_mut(&self.id) {
            entry.live.remove(&handle.marker);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.session.pools.get(&self.id).map_or(0, |p| p.live.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{MapError, MapSession, SessionError};
    use crate::renderable::{MarkerContent, MarkerProps};
    use crate::testing::{RecordingMap, RecordingView};
    use foundation::bounds::LngLat;

    fn props() -> MarkerProps {
        MarkerProps {
            position: LngLat::new(1.0, 2.0),
            content: MarkerContent::UserLocation,
        }
    }

    #[test]
    fn pool_names_are_exclusive() {
        let mut session = MapSession::new(RecordingMap::loaded(), RecordingView::default());
        let _a = session.claim_pool("clusters").unwrap();
        assert_eq!(
            session.claim_pool("clusters").unwrap_err(),
            SessionError::PoolTaken("clusters".to_string())
        );
        assert!(session.claim_pool("friends").is_ok());
    }

    #[test]
    fn create_mounts_and_destroy_unmounts() {
        let mut session = MapSession::new(RecordingMap::loaded(), RecordingView::default());
        let token = session.claim_pool("p").unwrap();

        let handle = session.pool(&token).create(props()).unwrap();
        assert_eq!(session.map().live_count(), 1);
        assert_eq!(session.view().mounted_count(), 1);
        assert_eq!(session.pool_len(&token), 1);

        session.pool(&token).destroy(handle).unwrap();
        assert_eq!(session.map().live_count(), 0);
        assert_eq!(session.view().mounted_count(), 0);
        assert!(session.pool(&token).is_empty());
    }

    #[test]
    fn foreign_handles_are_refused_and_returned() {
        let mut session = MapSession::new(RecordingMap::loaded(), RecordingView::default());
        let mine = session.claim_pool("mine").unwrap();
        let theirs = session.claim_pool("theirs").unwrap();

        let handle = session.pool(&theirs).create(props()).unwrap();
        let Err(SessionError::ForeignHandle(handle)) = session.pool(&mine).destroy(handle) else {
            panic!("foreign destroy must be refused");
        };
        assert_eq!(session.map().live_count(), 1);

        session.pool(&theirs).destroy(handle).unwrap();
        assert_eq!(session.map().live_count(), 0);
    }

    #[test]
    fn failed_mount_rolls_back_the_marker() {
        let mut view = RecordingView::default();
        view.fail_mounts = true;
        let mut session = MapSession::new(RecordingMap::loaded(), view);
        let token = session.claim_pool("p").unwrap();

        let err = session.pool(&token).create(props()).unwrap_err();
        assert!(matches!(err, MapError::Renderer(_)));
        assert_eq!(session.map().live_count(), 0);
        assert_eq!(session.pool_len(&token), 0);
    }

    #[tokio::test]
    async fn readiness_resolves_on_load() {
        let mut session = MapSession::new(RecordingMap::default(), RecordingView::default());
        let mut signal = session.readiness();
        assert!(!signal.is_ready());

        session.map_mut().loaded = true;
        session.mark_loaded();
        signal.wait().await.unwrap();
        assert!(session.is_ready());

        session.map_mut().detach();
        assert!(!session.is_ready());
    }
}
