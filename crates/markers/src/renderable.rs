use std::fmt;

use clustering::composition::ClusterComposition;
use clustering::index::ClusterId;
use clustering::model::{Pinory, PinoryId};
use foundation::bounds::LngLat;
use serde::Serialize;

/// Renderer-side marker identifier.
pub type MarkerId = u64;
/// Identifier of a mounted UI subtree.
pub type ViewId = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(pub(crate) u32);

/// Stable identity of a reconciled marker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerKey {
    Cluster(ClusterId),
    Note(PinoryId),
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKey::Cluster(id) => write!(f, "cluster-{id}"),
            MarkerKey::Note(id) => write!(f, "note-{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterBadge {
    pub cluster_id: ClusterId,
    pub point_count: usize,
    /// `None` renders a plain count badge.
    pub composition: Option<ClusterComposition>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinProps {
    pub pinory_id: PinoryId,
    pub image: Option<String>,
    pub mood: Option<String>,
    pub avatar: Option<String>,
    pub selected: bool,
}

impl PinProps {
    pub fn for_pinory(p: &Pinory, selected: bool) -> Self {
        Self {
            pinory_id: p.id.clone(),
            image: p.primary_image().map(str::to_string),
            mood: p.mood.clone(),
            avatar: p.avatar().map(str::to_string),
            selected,
        }
    }
}

/// What the UI runtime draws inside a marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MarkerContent {
    ClusterBadge(ClusterBadge),
    Pin(PinProps),
    FriendPin(PinProps),
    UserLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerProps {
    pub position: LngLat,
    pub content: MarkerContent,
}

impl MarkerProps {
    /// Friend pin for friend pinories, standard pin otherwise.
    pub fn pin(p: &Pinory, selected: bool) -> Self {
        let props = PinProps::for_pinory(p, selected);
        Self {
            position: p.position(),
            content: if p.is_friend() {
                MarkerContent::FriendPin(props)
            } else {
                MarkerContent::Pin(props)
            },
        }
    }
}

/// A created marker: one renderer marker plus its mounted view.
///
/// Not `Clone`; the pool that created it is the only place it can be
/// destroyed.
#[derive(Debug, PartialEq, Eq)]
pub struct MarkerHandle {
    pub(crate) pool: PoolId,
    pub(crate) marker: MarkerId,
    pub(crate) view: ViewId,
}

impl MarkerHandle {
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn marker(&self) -> MarkerId {
        self.marker
    }

    pub fn view(&self) -> ViewId {
        self.view
    }
}
