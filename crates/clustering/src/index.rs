use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use foundation::bounds::{GeoBounds, LngLat};
use foundation::math::mercator::{lat_to_y, lng_to_x, x_to_lng, y_to_lat};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use serde::Serialize;

use crate::model::Pinory;

pub type ClusterId = u64;

/// Highest zoom the cluster id encoding can address (`zoom + 1` must fit in 5 bits).
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

// Marks a node that has not been claimed at the level being built.
const UNVISITED: u8 = u8::MAX;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    /// Cluster radius in screen pixels.
    pub radius: f64,
    /// Tile extent the radius is relative to.
    pub extent: f64,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Minimum number of points that form a cluster.
    pub min_points: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            radius: 60.0,
            extent: 512.0,
            min_zoom: 0,
            max_zoom: 16,
            min_points: 2,
        }
    }
}

impl ClusterOptions {
    /// Defaults overridden by `PINORY_CLUSTER_RADIUS`, `PINORY_CLUSTER_EXTENT`,
    /// `PINORY_MIN_ZOOM`, `PINORY_MAX_ZOOM` and `PINORY_MIN_POINTS`.
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            radius: env_var_f64("PINORY_CLUSTER_RADIUS", d.radius),
            extent: env_var_f64("PINORY_CLUSTER_EXTENT", d.extent),
            min_zoom: env_var_u8("PINORY_MIN_ZOOM", d.min_zoom),
            max_zoom: env_var_u8("PINORY_MAX_ZOOM", d.max_zoom),
            min_points: env_var_usize("PINORY_MIN_POINTS", d.min_points),
        }
        .normalized()
    }

    /// Clamps fields into ranges the index can work with.
    pub fn normalized(mut self) -> Self {
        self.max_zoom = self.max_zoom.min(MAX_SUPPORTED_ZOOM);
        self.min_zoom = self.min_zoom.min(self.max_zoom);
        self.min_points = self.min_points.max(2);
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            self.radius = Self::default().radius;
        }
        if !(self.extent.is_finite() && self.extent > 0.0) {
            self.extent = Self::default().extent;
        }
        self
    }

    fn radius_at(&self, zoom: u8) -> f64 {
        self.radius / (self.extent * 2f64.powi(zoom as i32))
    }
}

fn env_var_u8(key: &str, default: u8) -> u8 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    ClusterNotFound(ClusterId),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::ClusterNotFound(id) => write!(f, "no cluster with the specified id: {id}"),
        }
    }
}

impl std::error::Error for IndexError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterFeature {
    pub id: ClusterId,
    pub center: LngLat,
    pub point_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointFeature {
    /// Position of the pinory in the indexed dataset.
    pub index: usize,
    pub center: LngLat,
}

/// One entry of a viewport query: either an aggregate or a single pinory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Feature {
    Cluster(ClusterFeature),
    Point(PointFeature),
}

impl Feature {
    pub fn center(&self) -> LngLat {
        match self {
            Feature::Cluster(c) => c.center,
            Feature::Point(p) => p.center,
        }
    }

    pub fn point_count(&self) -> usize {
        match self {
            Feature::Cluster(c) => c.point_count,
            Feature::Point(_) => 1,
        }
    }

    pub fn as_cluster(&self) -> Option<&ClusterFeature> {
        match self {
            Feature::Cluster(c) => Some(c),
            Feature::Point(_) => None,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum NodeKind {
    Point { source: usize },
    Cluster { id: ClusterId },
}

#[derive(Debug, Clone)]
struct Node {
    x: f64,
    y: f64,
    zoom: u8,
    kind: NodeKind,
    parent: Option<ClusterId>,
    num_points: usize,
}

// Node position in unit Mercator space, tagged with its index in `Level::nodes`.
type NodePoint = GeomWithData<[f64; 2], u32>;

#[derive(Clone)]
struct Level {
    nodes: Vec<Node>,
    tree: RTree<NodePoint>,
}

impl Level {
    fn new(nodes: Vec<Node>) -> Self {
        let points = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| NodePoint::new([n.x, n.y], i as u32))
            .collect();
        Self {
            nodes,
            tree: RTree::bulk_load(points),
        }
    }
}

impl std::fmt::Debug for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Level").field("nodes", &self.nodes.len()).finish()
    }
}

/// Node indices inside the box (inclusive), ascending.
fn range_hits(tree: &RTree<NodePoint>, min: [f64; 2], max: [f64; 2]) -> Vec<u32> {
    let mut hits: Vec<u32> = tree
        .locate_in_envelope(&AABB::from_corners(min, max))
        .map(|p| p.data)
        .collect();
    hits.sort_unstable();
    hits
}

/// Node indices within distance `r` of `center` (inclusive), ascending.
fn radius_hits(tree: &RTree<NodePoint>, center: [f64; 2], r: f64) -> Vec<u32> {
    let mut hits: Vec<u32> = tree
        .locate_within_distance(center, r * r)
        .map(|p| p.data)
        .collect();
    hits.sort_unstable();
    hits
}

/// Hierarchical greedy point clustering over a fixed pinory dataset.
///
/// Each integer zoom from `max_zoom + 1` (raw points) down to `min_zoom` is
/// stored as one level with its own R-tree in unit Mercator space.
///
/// Ordering contract:
/// - `clusters` returns features in ascending node order of the queried level.
/// - `children` and `leaves` are deterministic for a given build.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    options: ClusterOptions,
    pinories: Arc<Vec<Pinory>>,
    levels: Vec<Level>,
    generation: u64,
}

impl SpatialIndex {
    pub fn build(pinories: Arc<Vec<Pinory>>, options: ClusterOptions) -> Self {
        let options = options.normalized();
        let max = options.max_zoom as usize;
        let n = pinories.len();

        let mut points = Vec::with_capacity(n);
        for (i, p) in pinories.iter().enumerate() {
            if !p.position().is_valid() {
                tracing::debug!(id = %p.id, lng = p.lng, lat = p.lat, "skipping pinory with invalid position");
                continue;
            }
            points.push(Node {
                x: lng_to_x(p.lng),
                y: lat_to_y(p.lat),
                zoom: UNVISITED,
                kind: NodeKind::Point { source: i },
                parent: None,
                num_points: 1,
            });
        }

        let mut levels: Vec<Level> = (0..=max + 1).map(|_| Level::new(Vec::new())).collect();
        levels[max + 1] = Level::new(points);

        for z in (options.min_zoom as usize..=max).rev() {
            let next = cluster_level(&mut levels[z + 1], z as u8, &options, n);
            levels[z] = Level::new(next);
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(points = n, generation, "built spatial index");

        Self {
            options,
            pinories,
            levels,
            generation,
        }
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Unique per build; two indexes never share a generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.pinories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinories.is_empty()
    }

    pub fn pinories(&self) -> &Arc<Vec<Pinory>> {
        &self.pinories
    }

    pub fn pinory(&self, index: usize) -> Option<&Pinory> {
        self.pinories.get(index)
    }

    /// Clusters and points visible in `bounds` at `zoom`.
    pub fn clusters(&self, bounds: &GeoBounds, zoom: f64) -> Vec<Feature> {
        let mut min_lng = wrap_lng(bounds.west);
        let min_lat = bounds.south.clamp(-90.0, 90.0);
        let mut max_lng = if bounds.east == 180.0 {
            180.0
        } else {
            wrap_lng(bounds.east)
        };
        let max_lat = bounds.north.clamp(-90.0, 90.0);

        if bounds.east - bounds.west >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let mut eastern = self.clusters(&GeoBounds::new(min_lng, min_lat, 180.0, max_lat), zoom);
            let western = self.clusters(&GeoBounds::new(-180.0, min_lat, max_lng, max_lat), zoom);
            eastern.extend(western);
            return eastern;
        }

        let Some(level) = self.levels.get(self.limit_zoom(zoom)) else {
            return Vec::new();
        };
        range_hits(
            &level.tree,
            [lng_to_x(min_lng), lat_to_y(max_lat)],
            [lng_to_x(max_lng), lat_to_y(min_lat)],
        )
        .into_iter()
        .map(|i| self.feature_of(&level.nodes[i as usize]))
        .collect()
    }

    /// Direct children of a cluster, one zoom level down.
    pub fn children(&self, cluster_id: ClusterId) -> Result<Vec<Feature>, IndexError> {
        let (origin_idx, origin_zoom) = self.decode(cluster_id)?;
        let not_found = IndexError::ClusterNotFound(cluster_id);

        let level = self.levels.get(origin_zoom as usize).ok_or(not_found.clone())?;
        let origin = level.nodes.get(origin_idx).ok_or(not_found.clone())?;

        let r = self.options.radius_at(origin_zoom - 1);
        let children: Vec<Feature> = radius_hits(&level.tree, [origin.x, origin.y], r)
            .into_iter()
            .map(|i| &level.nodes[i as usize])
            .filter(|node| node.parent == Some(cluster_id))
            .map(|node| self.feature_of(node))
            .collect();

        if children.is_empty() {
            return Err(not_found);
        }
        Ok(children)
    }

    /// Leaf pinories of a cluster, depth first, skipping `offset` and
    /// returning at most `limit`.
    pub fn leaves(
        &self,
        cluster_id: ClusterId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<&Pinory>, IndexError> {
        let mut out = Vec::new();
        if limit == 0 {
            // Still reject unknown ids.
            self.decode(cluster_id)?;
            return Ok(out);
        }
        self.append_leaves(&mut out, cluster_id, limit, offset, 0)?;
        Ok(out)
    }

    /// All leaf pinories of a cluster.
    pub fn all_leaves(&self, cluster_id: ClusterId) -> Result<Vec<&Pinory>, IndexError> {
        self.leaves(cluster_id, usize::MAX, 0)
    }

    /// Zoom at which the cluster breaks apart into more than one child.
    pub fn expansion_zoom(&self, cluster_id: ClusterId) -> Result<u8, IndexError> {
        let (_, origin_zoom) = self.decode(cluster_id)?;
        let mut expansion = origin_zoom - 1;
        let mut id = cluster_id;

        while expansion <= self.options.max_zoom {
            let children = self.children(id)?;
            expansion += 1;
            if children.len() != 1 {
                break;
            }
            match &children[0] {
                Feature::Cluster(c) => id = c.id,
                Feature::Point(_) => break,
            }
        }
        Ok(expansion)
    }

    fn append_leaves<'a>(
        &'a self,
        out: &mut Vec<&'a Pinory>,
        cluster_id: ClusterId,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize, IndexError> {
        for child in self.children(cluster_id)? {
            match child {
                Feature::Cluster(c) => {
                    if skipped + c.point_count <= offset {
                        skipped += c.point_count;
                    } else {
                        skipped = self.append_leaves(out, c.id, limit, offset, skipped)?;
                    }
                }
                Feature::Point(p) => {
                    if skipped < offset {
                        skipped += 1;
                    } else if let Some(pinory) = self.pinories.get(p.index) {
                        out.push(pinory);
                    }
                }
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(skipped)
    }

    fn decode(&self, cluster_id: ClusterId) -> Result<(usize, u8), IndexError> {
        let n = self.pinories.len() as u64;
        let not_found = IndexError::ClusterNotFound(cluster_id);
        let Some(base) = cluster_id.checked_sub(n) else {
            return Err(not_found);
        };
        let origin_zoom = (base % 32) as u8;
        if origin_zoom < 1 || origin_zoom > self.options.max_zoom + 1 {
            return Err(not_found);
        }
        Ok(((base >> 5) as usize, origin_zoom))
    }

    fn limit_zoom(&self, zoom: f64) -> usize {
        let lo = self.options.min_zoom as f64;
        let hi = self.options.max_zoom as f64 + 1.0;
        zoom.floor().min(hi).max(lo) as usize
    }

    fn feature_of(&self, node: &Node) -> Feature {
        match node.kind {
            NodeKind::Cluster { id } => Feature::Cluster(ClusterFeature {
                id,
                center: LngLat::new(x_to_lng(node.x), y_to_lat(node.y)),
                point_count: node.num_points,
            }),
            NodeKind::Point { source } => Feature::Point(PointFeature {
                index: source,
                center: self.pinories[source].position(),
            }),
        }
    }
}

fn wrap_lng(lng: f64) -> f64 {
    ((lng + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
}

fn encode_cluster_id(index: usize, zoom: u8, n: usize) -> ClusterId {
    ((index as u64) << 5) + (zoom as u64 + 1) + n as u64
}

// Greedily merges the nodes of `level` (one zoom above `zoom`) that fall
// within the cluster radius, returning the nodes of the level at `zoom`.
fn cluster_level(level: &mut Level, zoom: u8, options: &ClusterOptions, n: usize) -> Vec<Node> {
    let r = options.radius_at(zoom);
    let Level { nodes, tree } = level;
    let mut next = Vec::new();

    for i in 0..nodes.len() {
        if nodes[i].zoom <= zoom {
            continue;
        }
        nodes[i].zoom = zoom;

        let (px, py, own_points) = (nodes[i].x, nodes[i].y, nodes[i].num_points);
        let neighbors = radius_hits(tree, [px, py], r);

        let mut num_points = own_points;
        for &nb in &neighbors {
            let b = &nodes[nb as usize];
            if b.zoom > zoom {
                num_points += b.num_points;
            }
        }

        if num_points > own_points && num_points >= options.min_points {
            let id = encode_cluster_id(i, zoom, n);
            let mut wx = px * own_points as f64;
            let mut wy = py * own_points as f64;

            for &nb in &neighbors {
                let b = &mut nodes[nb as usize];
                if b.zoom <= zoom {
                    continue;
                }
                b.zoom = zoom;
                b.parent = Some(id);
                wx += b.x * b.num_points as f64;
                wy += b.y * b.num_points as f64;
            }
            nodes[i].parent = Some(id);

            next.push(Node {
                x: wx / num_points as f64,
                y: wy / num_points as f64,
                zoom: UNVISITED,
                kind: NodeKind::Cluster { id },
                parent: None,
                num_points,
            });
        } else {
            next.push(carry_over(&nodes[i]));
            if num_points > 1 {
                for &nb in &neighbors {
                    let b = &mut nodes[nb as usize];
                    if b.zoom <= zoom {
                        continue;
                    }
                    b.zoom = zoom;
                    next.push(carry_over(b));
                }
            }
        }
    }

    next
}

fn carry_over(node: &Node) -> Node {
    Node {
        zoom: UNVISITED,
        parent: None,
        ..node.clone()
    }
}

/// Holds the current index and rebuilds it only when the dataset changes.
///
/// A change is a different `Arc` allocation or a different length; the
/// contents behind an unchanged `Arc` are assumed immutable.
#[derive(Debug, Default)]
pub struct IndexAdapter {
    options: ClusterOptions,
    index: Option<SpatialIndex>,
    built_len: usize,
    rebuilds: u64,
}

impl IndexAdapter {
    pub fn new(options: ClusterOptions) -> Self {
        Self {
            options,
            index: None,
            built_len: 0,
            rebuilds: 0,
        }
    }

    /// Returns `true` if the index was rebuilt.
    pub fn sync(&mut self, pinories: &Arc<Vec<Pinory>>) -> bool {
        if let Some(index) = &self.index
            && Arc::ptr_eq(index.pinories(), pinories)
            && self.built_len == pinories.len()
        {
            return false;
        }

        self.index = Some(SpatialIndex::build(pinories.clone(), self.options.clone()));
        self.built_len = pinories.len();
        self.rebuilds += 1;
        true
    }

    pub fn index(&self) -> Option<&SpatialIndex> {
        self.index.as_ref()
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
