pub mod friends;
pub mod layer;
pub mod reconciler;
pub mod renderable;
pub mod session;
pub mod tracker;
pub mod user_location;

#[cfg(test)]
pub(crate) mod testing;

pub use friends::{FetchError, FetchOutcome, FetchTicket, FriendOverlay, FriendSource, HttpFriendSource, StaticFriendSource};
pub use layer::PinoryLayer;
pub use reconciler::{ClickOutcome, MarkerEvent, MarkerReconciler, ReconcileReport, ReconcilerConfig};
pub use renderable::{MarkerContent, MarkerHandle, MarkerKey, MarkerProps};
pub use session::{MapError, MapSession, MapSurface, MarkerView, Pool, PoolToken, SessionError};
pub use tracker::{BoundsChanged, BoundsTracker, TrackerConfig, ViewportState};
pub use user_location::UserLocationMarker;
