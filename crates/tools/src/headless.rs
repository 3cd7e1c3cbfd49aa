use std::collections::BTreeMap;

use foundation::bounds::{GeoBounds, LngLat};
use markers::renderable::{MarkerContent, MarkerId, ViewId};
use markers::session::{MapError, MapSurface, MarkerView};

/// Renderer stand-in for running the marker core without a browser.
///
/// Keeps a camera and a marker table; `fly_to` recentres the camera and
/// scales the visible span by the zoom difference.
#[derive(Debug)]
pub struct HeadlessMap {
    bounds: GeoBounds,
    zoom: f64,
    markers: BTreeMap<MarkerId, LngLat>,
    next_id: MarkerId,
}

impl HeadlessMap {
    pub fn new(bounds: GeoBounds, zoom: f64) -> Self {
        Self {
            bounds,
            zoom,
            markers: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn set_camera(&mut self, bounds: GeoBounds, zoom: f64) {
        self.bounds = bounds;
        self.zoom = zoom;
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

impl MapSurface for HeadlessMap {
    fn is_loaded(&self) -> bool {
        true
    }

    fn bounds(&self) -> Result<GeoBounds, MapError> {
        Ok(self.bounds)
    }

    fn zoom(&self) -> Result<f64, MapError> {
        Ok(self.zoom)
    }

    fn add_marker(&mut self, at: LngLat) -> Result<MarkerId, MapError> {
        self.next_id += 1;
        self.markers.insert(self.next_id, at);
        Ok(self.next_id)
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        self.markers.remove(&marker);
    }

    fn fly_to(&mut self, center: LngLat, zoom: f64) -> Result<(), MapError> {
        let scale = 2f64.powf(self.zoom - zoom);
        let half_w = (self.bounds.east - self.bounds.west).abs() * 0.5 * scale;
        let half_h = (self.bounds.north - self.bounds.south) * 0.5 * scale;
        self.bounds = GeoBounds::new(
            center.lng - half_w,
            (center.lat - half_h).max(-90.0),
            center.lng + half_w,
            (center.lat + half_h).min(90.0),
        );
        self.zoom = zoom;
        tracing::debug!(lng = center.lng, lat = center.lat, zoom, "fly to");
        Ok(())
    }
}

/// UI runtime stand-in; keeps mounted contents for inspection.
#[derive(Debug, Default)]
pub struct HeadlessView {
    mounted: BTreeMap<ViewId, MarkerContent>,
    next_id: ViewId,
}

impl HeadlessView {
    pub fn mounted(&self) -> impl Iterator<Item = &MarkerContent> {
        self.mounted.values()
    }
}

impl MarkerView for HeadlessView {
    fn mount(&mut self, _marker: MarkerId, content: &MarkerContent) -> Result<ViewId, MapError> {
        self.next_id += 1;
        self.mounted.insert(self.next_id, content.clone());
        Ok(self.next_id)
    }

    fn unmount(&mut self, view: ViewId) {
        self.mounted.remove(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::{HeadlessMap, HeadlessView};
    use foundation::bounds::{GeoBounds, LngLat};
    use markers::renderable::MarkerContent;
    use markers::session::{MapSurface, MarkerView};

    #[test]
    fn fly_to_recentres_and_scales() {
        let mut map = HeadlessMap::new(GeoBounds::new(0.0, 0.0, 4.0, 2.0), 10.0);
        map.fly_to(LngLat::new(10.0, 10.0), 11.0).unwrap();

        let b = map.bounds().unwrap();
        assert_eq!(b, GeoBounds::new(9.0, 9.5, 11.0, 10.5));
        assert_eq!(map.zoom().unwrap(), 11.0);
    }

    #[test]
    fn markers_and_views_are_tracked() {
        let mut map = HeadlessMap::new(GeoBounds::world(), 2.0);
        let mut view = HeadlessView::default();

        let m = map.add_marker(LngLat::new(1.0, 1.0)).unwrap();
        let v = view.mount(m, &MarkerContent::UserLocation).unwrap();
        assert_eq!(map.marker_count(), 1);
        assert_eq!(view.mounted().count(), 1);

        view.unmount(v);
        map.remove_marker(m);
        assert_eq!(map.marker_count(), 0);
        assert_eq!(view.mounted().count(), 0);
    }
}
