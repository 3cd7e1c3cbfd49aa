//! In-memory renderer and UI runtime doubles that record every call.

use std::collections::BTreeMap;
use std::sync::Arc;

use clustering::model::{Creator, Pinory};
use foundation::bounds::{GeoBounds, LngLat};

use crate::renderable::{MarkerContent, MarkerId, ViewId};
use crate::session::{MapError, MapSurface, MarkerView};

#[derive(Debug)]
pub(crate) struct RecordingMap {
    pub loaded: bool,
    pub detached: bool,
    /// Detach after this many successful `add_marker` calls.
    pub detach_after: Option<usize>,
    pub bounds: GeoBounds,
    pub zoom: f64,
    pub live: BTreeMap<MarkerId, LngLat>,
    pub added: usize,
    pub removed: Vec<MarkerId>,
    pub flights: Vec<(LngLat, f64)>,
    next_id: MarkerId,
}

impl Default for RecordingMap {
    fn default() -> Self {
        Self {
            loaded: false,
            detached: false,
            detach_after: None,
            bounds: GeoBounds::new(126.5, 37.3, 127.5, 37.8),
            zoom: 10.0,
            live: BTreeMap::new(),
            added: 0,
            removed: Vec::new(),
            flights: Vec::new(),
            next_id: 0,
        }
    }
}

impl RecordingMap {
    pub fn loaded() -> Self {
        Self {
            loaded: true,
            ..Self::default()
        }
    }

    pub fn detach(&mut self) {
        self.detached = true;
    }

    pub fn set_camera(&mut self, bounds: GeoBounds, zoom: f64) {
        self.bounds = bounds;
        self.zoom = zoom;
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn check(&self) -> Result<(), MapError> {
        if self.detached {
            return Err(MapError::Detached);
        }
        if !self.loaded {
            return Err(MapError::NotReady);
        }
        Ok(())
    }
}

impl MapSurface for RecordingMap {
    fn is_loaded(&self) -> bool {
        self.loaded && !self.detached
    }

    fn bounds(&self) -> Result<GeoBounds, MapError> {
        self.check()?;
        Ok(self.bounds)
    }

    fn zoom(&self) -> Result<f64, MapError> {
        self.check()?;
        Ok(self.zoom)
    }

    fn add_marker(&mut self, at: LngLat) -> Result<MarkerId, MapError> {
        if let Some(limit) = self.detach_after
            && self.added >= limit
        {
            self.detached = true;
        }
        self.check()?;
        self.next_id += 1;
        self.live.insert(self.next_id, at);
        self.added += 1;
        Ok(self.next_id)
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        self.live.remove(&marker);
        self.removed.push(marker);
    }

    fn fly_to(&mut self, center: LngLat, zoom: f64) -> Result<(), MapError> {
        self.check()?;
        self.flights.push((center, zoom));
        self.zoom = zoom;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingView {
    pub fail_mounts: bool,
    pub mounted: BTreeMap<ViewId, (MarkerId, MarkerContent)>,
    pub unmounted: Vec<ViewId>,
    next_id: ViewId,
}

impl RecordingView {
    pub fn mounted_count(&self) -> usize {
        self.mounted.len()
    }

    pub fn contents(&self) -> impl Iterator<Item = &MarkerContent> {
        self.mounted.values().map(|(_, c)| c)
    }
}

impl MarkerView for RecordingView {
    fn mount(&mut self, marker: MarkerId, content: &MarkerContent) -> Result<ViewId, MapError> {
        if self.fail_mounts {
            return Err(MapError::Renderer("mount failed".to_string()));
        }
        self.next_id += 1;
        self.mounted.insert(self.next_id, (marker, content.clone()));
        Ok(self.next_id)
    }

    fn unmount(&mut self, view: ViewId) {
        self.mounted.remove(&view);
        self.unmounted.push(view);
    }
}

/// `n` pinories ~20 m apart around Seoul City Hall.
pub(crate) fn dense_pinories(n: usize) -> Arc<Vec<Pinory>> {
    let pins = (0..n)
        .map(|i| {
            let dx = (i % 10) as f64 * 0.0002;
            let dy = (i / 10) as f64 * 0.0002;
            Pinory::new(format!("p{i}"), 126.978 + dx, 37.566 + dy)
        })
        .collect();
    Arc::new(pins)
}

/// `n` pinories half a degree apart, ids `s0..`.
pub(crate) fn scattered_pinories(n: usize) -> Arc<Vec<Pinory>> {
    let pins = (0..n)
        .map(|i| Pinory::new(format!("s{i}"), 126.0 + i as f64 * 0.5, 37.5))
        .collect();
    Arc::new(pins)
}

/// Own pinories with one image each, then friend pinories with avatars.
pub(crate) fn mixed_pinories(users: usize, friends: usize) -> Arc<Vec<Pinory>> {
    let mut pins = Vec::new();
    for i in 0..users {
        pins.push(
            Pinory::new(format!("own-{i}"), 10.0 + i as f64 * 0.0001, 10.0)
                .with_images([format!("https://cdn.example/own-{i}.webp")]),
        );
    }
    for i in 0..friends {
        let creator = Creator::new(format!("friend-{i}")).with_avatar(format!("https://cdn.example/avatar-{i}.png"));
        pins.push(Pinory::friend(format!("fr-{i}"), 10.0, 10.0 + i as f64 * 0.0001, creator));
    }
    Arc::new(pins)
}
