use std::time::Duration;

/// Milliseconds on a monotonic timeline.
///
/// The origin is whatever the clock that produced it chose; only differences
/// between two values from the same clock are meaningful.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Millis(pub u64);

impl Millis {
    pub fn saturating_since(self, earlier: Millis) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    pub fn plus(self, d: Duration) -> Millis {
        Millis(self.0.saturating_add(d.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::Millis;
    use std::time::Duration;

    #[test]
    fn since_saturates_for_reordered_samples() {
        assert_eq!(Millis(150).saturating_since(Millis(0)), Duration::from_millis(150));
        assert_eq!(Millis(10).saturating_since(Millis(30)), Duration::ZERO);
    }

    #[test]
    fn plus_advances() {
        assert_eq!(Millis(5).plus(Duration::from_millis(10)), Millis(15));
    }
}
