use std::env;
use std::time::Duration;

use foundation::bounds::GeoBounds;
use runtime::clock::Clock;
use runtime::readiness::{ReadinessClosed, ReadySignal};
use runtime::throttle::Throttle;
use serde::Serialize;

use crate::session::{MapError, MapSession, MapSurface, MarkerView};

pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Minimum spacing between accepted move-end updates.
    pub throttle: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
        }
    }
}

impl TrackerConfig {
    /// Reads `PINORY_BOUNDS_THROTTLE_MS`.
    pub fn from_env() -> Self {
        let ms = env::var("PINORY_BOUNDS_THROTTLE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_THROTTLE.as_millis() as u64);
        Self {
            throttle: Duration::from_millis(ms),
        }
    }
}

/// Payload of the external bounds-changed callback.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct BoundsChanged {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl From<GeoBounds> for BoundsChanged {
    fn from(b: GeoBounds) -> Self {
        Self {
            north: b.north,
            south: b.south,
            east: b.east,
            west: b.west,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewportState {
    pub bounds: GeoBounds,
    pub zoom: f64,
}

pub type BoundsHandler = Box<dyn FnMut(BoundsChanged)>;

/// Follows the map camera and publishes throttled viewport updates.
///
/// The initial capture happens once, on the first successful ready signal,
/// and does not count against the throttle window.
pub struct BoundsTracker<C> {
    clock: C,
    throttle: Throttle,
    initialized: bool,
    state: Option<ViewportState>,
    accepted: u64,
    on_change: Option<BoundsHandler>,
}

impl<C: Clock> BoundsTracker<C> {
    pub fn new(clock: C, config: TrackerConfig) -> Self {
        Self {
            clock,
            throttle: Throttle::new(config.throttle),
            initialized: false,
            state: None,
            accepted: 0,
            on_change: None,
        }
    }

    pub fn with_bounds_handler(mut self, handler: impl FnMut(BoundsChanged) + 'static) -> Self {
        self.on_change = Some(Box::new(handler));
        self
    }

    pub fn state(&self) -> Option<&ViewportState> {
        self.state.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of accepted updates, including the initial capture.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Captures the initial viewport. Only the first successful call has an
    /// effect.
    pub fn on_map_ready<M: MapSurface, V: MarkerView>(
        &mut self,
        session: &MapSession<M, V>,
    ) -> Option<ViewportState> {
        if self.initialized {
            return None;
        }
        match read_viewport(session) {
            Ok(state) => {
                self.initialized = true;
                self.accept(state);
                Some(state)
            }
            Err(err) => {
                tracing::debug!(error = %err, "initial viewport capture skipped");
                None
            }
        }
    }

    /// Awaits map readiness once, then captures the initial viewport.
    pub async fn initialize<M: MapSurface, V: MarkerView>(
        &mut self,
        mut ready: ReadySignal,
        session: &MapSession<M, V>,
    ) -> Result<Option<ViewportState>, ReadinessClosed> {
        ready.wait().await?;
        Ok(self.on_map_ready(session))
    }

    /// Re-reads the viewport unless the previous accepted move-end is
    /// younger than the throttle interval. Dropped events are not queued.
    /// A failed read does not start a throttle window.
    pub fn on_move_end<M: MapSurface, V: MarkerView>(
        &mut self,
        session: &MapSession<M, V>,
    ) -> Option<ViewportState> {
        let now = self.clock.now();
        if !self.throttle.would_accept(now) {
            tracing::trace!("move-end throttled");
            return None;
        }
        match read_viewport(session) {
            Ok(state) => {
                self.throttle.commit(now);
                self.accept(state);
                Some(state)
            }
            Err(err) => {
                tracing::debug!(error = %err, "move-end viewport read failed");
                None
            }
        }
    }

    fn accept(&mut self, state: ViewportState) {
        self.state = Some(state);
        self.accepted += 1;
        if let Some(handler) = self.on_change.as_mut() {
            handler(BoundsChanged::from(state.bounds));
        }
    }
}

fn read_viewport<M: MapSurface, V: MarkerView>(session: &MapSession<M, V>) -> Result<ViewportState, MapError> {
    if !session.is_ready() {
        return Err(MapError::NotReady);
    }
    Ok(ViewportState {
        bounds: session.bounds()?,
        zoom: session.zoom()?,
    })
}

#[cfg(test)]
mod tests {
    use super::{BoundsChanged, BoundsTracker, TrackerConfig};
    use crate::session::MapSession;
    use crate::testing::{RecordingMap, RecordingView};
    use foundation::bounds::GeoBounds;
    use foundation::time::Millis;
    use runtime::clock::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn move_end_is_throttled() {
        let clock = ManualClock::new();
        let mut session = MapSession::new(RecordingMap::loaded(), RecordingView::default());
        let mut tracker = BoundsTracker::new(clock.clone(), TrackerConfig::default());

        let mut accepted = Vec::new();
        for (t, west) in [(0, 1.0), (30, 2.0), (150, 3.0)] {
            clock.set(Millis(t));
            session.map_mut().set_camera(GeoBounds::new(west, 0.0, west + 1.0, 1.0), 12.0);
            if tracker.on_move_end(&session).is_some() {
                accepted.push(t);
            }
        }

        assert_eq!(accepted, vec![0, 150]);
        assert_eq!(tracker.state().unwrap().bounds.west, 3.0);
    }

    #[test]
    fn failed_read_does_not_consume_the_window() {
        let clock = ManualClock::new();
        let mut session = MapSession::new(RecordingMap::default(), RecordingView::default());
        let mut tracker = BoundsTracker::new(clock.clone(), TrackerConfig::default());

        assert!(tracker.on_move_end(&session).is_none());

        session.map_mut().loaded = true;
        session.mark_loaded();
        clock.set(Millis(50));
        assert!(tracker.on_move_end(&session).is_some());
        assert_eq!(tracker.accepted(), 1);

        clock.set(Millis(120));
        assert!(tracker.on_move_end(&session).is_none());
    }

    #[test]
    fn initial_capture_happens_once_and_skips_the_throttle() {
        let clock = ManualClock::new();
        let mut session = MapSession::new(RecordingMap::loaded(), RecordingView::default());
        let mut tracker = BoundsTracker::new(clock.clone(), TrackerConfig::default());

        assert!(tracker.on_map_ready(&session).is_some());
        session.map_mut().set_camera(GeoBounds::new(0.0, 0.0, 1.0, 1.0), 4.0);
        assert!(tracker.on_map_ready(&session).is_none());
        assert_eq!(tracker.state().unwrap().zoom, 10.0);

        // Same instant as the initial capture, still accepted.
        assert!(tracker.on_move_end(&session).is_some());
        assert_eq!(tracker.accepted(), 2);
    }

    #[test]
    fn failed_ready_capture_can_be_retried() {
        let mut session = MapSession::new(RecordingMap::default(), RecordingView::default());
        let mut tracker = BoundsTracker::new(ManualClock::new(), TrackerConfig::default());

        assert!(tracker.on_map_ready(&session).is_none());
        assert!(!tracker.is_initialized());

        session.map_mut().loaded = true;
        session.mark_loaded();
        assert!(tracker.on_map_ready(&session).is_some());
        assert!(tracker.is_initialized());
    }

    #[test]
    fn handler_receives_bounds() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let session = MapSession::new(RecordingMap::loaded(), RecordingView::default());
        let mut tracker = BoundsTracker::new(ManualClock::new(), TrackerConfig::default())
            .with_bounds_handler(move |b| sink.borrow_mut().push(b));

        tracker.on_map_ready(&session);
        assert_eq!(
            *seen.borrow(),
            vec![BoundsChanged {
                north: 37.8,
                south: 37.3,
                east: 127.5,
                west: 126.5,
            }]
        );
    }

    #[tokio::test]
    async fn initialize_waits_for_readiness() {
        let session = MapSession::new(RecordingMap::loaded(), RecordingView::default());
        let mut tracker = BoundsTracker::new(ManualClock::new(), TrackerConfig::default());

        let state = tracker.initialize(session.readiness(), &session).await.unwrap();
        assert_eq!(state.map(|s| s.zoom), Some(10.0));
    }
}
