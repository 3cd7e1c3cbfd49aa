use std::sync::Arc;

use foundation::bounds::GeoBounds;
use foundation::math::precision::StableF64;

use crate::index::{Feature, SpatialIndex};

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryKey {
    bounds: [StableF64; 4],
    generation: u64,
    len: usize,
    zoom: i64,
}

/// Memoized visible-feature query.
///
/// Results are keyed on bounds, index generation, dataset length and the
/// integer zoom band, so fractional zoom changes inside one band reuse the
/// previous result.
#[derive(Debug, Default)]
pub struct ViewportQuery {
    last: Option<(QueryKey, Arc<[Feature]>)>,
    recomputations: u64,
}

impl ViewportQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(
        &mut self,
        bounds: Option<&GeoBounds>,
        zoom: f64,
        index: Option<&SpatialIndex>,
    ) -> Arc<[Feature]> {
        let (Some(bounds), Some(index)) = (bounds, index) else {
            return empty();
        };
        if index.is_empty() {
            return empty();
        }

        let key = QueryKey {
            bounds: bounds.key(),
            generation: index.generation(),
            len: index.len(),
            zoom: zoom.floor() as i64,
        };
        if let Some((last_key, features)) = &self.last
            && *last_key == key
        {
            return features.clone();
        }

        self.recomputations += 1;
        let features: Arc<[Feature]> = index.clusters(bounds, zoom).into();
        tracing::trace!(count = features.len(), zoom, "viewport recomputed");
        self.last = Some((key, features.clone()));
        features
    }

    /// Number of queries that missed the memo.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

fn empty() -> Arc<[Feature]> {
    Arc::from(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::ViewportQuery;
    use crate::index::{ClusterOptions, SpatialIndex};
    use crate::testing::seoul_cluster;
    use foundation::bounds::GeoBounds;
    use std::sync::Arc;

    fn view() -> GeoBounds {
        GeoBounds::new(126.9, 37.5, 127.1, 37.6)
    }

    #[test]
    fn fractional_zoom_in_one_band_is_memoized() {
        let index = SpatialIndex::build(seoul_cluster(50), ClusterOptions::default());
        let mut q = ViewportQuery::new();

        let a = q.query(Some(&view()), 12.1, Some(&index));
        let b = q.query(Some(&view()), 12.9, Some(&index));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(q.recomputations(), 1);

        let c = q.query(Some(&view()), 13.0, Some(&index));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(q.recomputations(), 2);
    }

    #[test]
    fn new_bounds_or_index_recompute() {
        let data = seoul_cluster(20);
        let index = SpatialIndex::build(data.clone(), ClusterOptions::default());
        let mut q = ViewportQuery::new();

        q.query(Some(&view()), 10.0, Some(&index));
        q.query(Some(&GeoBounds::new(126.0, 37.0, 128.0, 38.0)), 10.0, Some(&index));
        assert_eq!(q.recomputations(), 2);

        let rebuilt = SpatialIndex::build(data, ClusterOptions::default());
        q.query(Some(&GeoBounds::new(126.0, 37.0, 128.0, 38.0)), 10.0, Some(&rebuilt));
        assert_eq!(q.recomputations(), 3);
    }

    #[test]
    fn missing_inputs_give_empty_results() {
        let index = SpatialIndex::build(seoul_cluster(5), ClusterOptions::default());
        let empty = SpatialIndex::build(Arc::new(Vec::new()), ClusterOptions::default());
        let mut q = ViewportQuery::new();

        assert!(q.query(None, 10.0, Some(&index)).is_empty());
        assert!(q.query(Some(&view()), 10.0, None).is_empty());
        assert!(q.query(Some(&view()), 10.0, Some(&empty)).is_empty());
        assert_eq!(q.recomputations(), 0);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let index = SpatialIndex::build(seoul_cluster(5), ClusterOptions::default());
        let mut q = ViewportQuery::new();
        q.query(Some(&view()), 10.0, Some(&index));
        q.invalidate();
        q.query(Some(&view()), 10.0, Some(&index));
        assert_eq!(q.recomputations(), 2);
    }
}
