pub mod composition;
pub mod index;
pub mod model;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use composition::{ClusterComposition, CompositionKind, analyze, analyze_or_none};
pub use index::{ClusterFeature, ClusterId, ClusterOptions, Feature, IndexAdapter, IndexError, PointFeature, SpatialIndex};
pub use model::{Creator, Pinory, PinoryFilter, PinoryId, PinoryType, UserId, ValidationError};
pub use viewport::ViewportQuery;
