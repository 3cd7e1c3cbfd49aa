use std::time::Duration;

use foundation::time::Millis;

/// Leading-edge throttle without queuing.
///
/// The first call is always accepted. Later calls are accepted only once
/// `interval` has elapsed since the last accepted call; rejected calls are
/// dropped, not deferred.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_accepted: Option<Millis>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_accepted(&self) -> Option<Millis> {
        self.last_accepted
    }

    /// Whether a call at `now` would pass the gate. Does not record anything.
    pub fn would_accept(&self, now: Millis) -> bool {
        match self.last_accepted {
            Some(last) => now.saturating_since(last) >= self.interval,
            None => true,
        }
    }

    /// Starts a new window at `now`.
    pub fn commit(&mut self, now: Millis) {
        self.last_accepted = Some(now);
    }

    /// Returns `true` and records `now` if the call passes the gate.
    pub fn try_acquire(&mut self, now: Millis) -> bool {
        if !self.would_accept(now) {
            return false;
        }
        self.commit(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::Throttle;
    use foundation::time::Millis;
    use std::time::Duration;

    #[test]
    fn drops_calls_inside_the_window() {
        let mut t = Throttle::new(Duration::from_millis(100));
        assert!(t.try_acquire(Millis(0)));
        assert!(!t.try_acquire(Millis(30)));
        assert!(t.try_acquire(Millis(150)));
        assert_eq!(t.last_accepted(), Some(Millis(150)));
    }

    #[test]
    fn boundary_is_inclusive() {
        let mut t = Throttle::new(Duration::from_millis(100));
        assert!(t.try_acquire(Millis(0)));
        assert!(t.try_acquire(Millis(100)));
    }

    #[test]
    fn dropped_calls_do_not_extend_the_window() {
        let mut t = Throttle::new(Duration::from_millis(100));
        assert!(t.try_acquire(Millis(0)));
        assert!(!t.try_acquire(Millis(90)));
        assert!(t.try_acquire(Millis(101)));
    }

    #[test]
    fn checking_does_not_open_a_window() {
        let mut t = Throttle::new(Duration::from_millis(100));
        assert!(t.would_accept(Millis(0)));
        assert_eq!(t.last_accepted(), None);
        assert!(t.would_accept(Millis(50)));

        t.commit(Millis(50));
        assert!(!t.would_accept(Millis(120)));
        assert!(t.would_accept(Millis(150)));
    }

    #[test]
    fn reset_reopens_the_gate() {
        let mut t = Throttle::new(Duration::from_millis(100));
        assert!(t.try_acquire(Millis(0)));
        t.reset();
        assert!(t.try_acquire(Millis(1)));
    }
}
