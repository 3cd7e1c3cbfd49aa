pub mod clock;
pub mod event_bus;
pub mod readiness;
pub mod throttle;

pub use clock::*;
pub use event_bus::*;
pub use readiness::*;
pub use throttle::*;
