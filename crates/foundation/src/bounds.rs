use serde::{Deserialize, Serialize};

use crate::math::precision::StableF64;

/// A WGS84 position in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        LngLat { lng, lat }
    }

    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// Geographic viewport bounds in degrees.
///
/// `west > east` is allowed and means the box crosses the antimeridian.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        GeoBounds {
            west,
            south,
            east,
            north,
        }
    }

    /// The whole world.
    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    pub fn contains(&self, p: LngLat) -> bool {
        if p.lat < self.south || p.lat > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            p.lng >= self.west || p.lng <= self.east
        } else {
            p.lng >= self.west && p.lng <= self.east
        }
    }

    pub fn center(&self) -> LngLat {
        let mut lng = if self.crosses_antimeridian() {
            (self.west + self.east + 360.0) * 0.5
        } else {
            (self.west + self.east) * 0.5
        };
        if lng > 180.0 {
            lng -= 360.0;
        }
        LngLat::new(lng, (self.south + self.north) * 0.5)
    }

    /// Deterministic key for memoization (exact float identity, `-0.0 == 0.0`).
    pub fn key(&self) -> [StableF64; 4] {
        [
            StableF64(self.west),
            StableF64(self.south),
            StableF64(self.east),
            StableF64(self.north),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoBounds, LngLat};

    #[test]
    fn contains_handles_antimeridian() {
        let b = GeoBounds::new(170.0, -10.0, -170.0, 10.0);
        assert!(b.crosses_antimeridian());
        assert!(b.contains(LngLat::new(175.0, 0.0)));
        assert!(b.contains(LngLat::new(-175.0, 0.0)));
        assert!(!b.contains(LngLat::new(0.0, 0.0)));
    }

    #[test]
    fn center_wraps_across_antimeridian() {
        let b = GeoBounds::new(170.0, -10.0, -170.0, 10.0);
        let c = b.center();
        assert_eq!(c.lat, 0.0);
        assert!((c.lng - 180.0).abs() < 1e-9 || (c.lng + 180.0).abs() < 1e-9);
    }

    #[test]
    fn key_treats_signed_zero_as_equal() {
        let a = GeoBounds::new(-0.0, 1.0, 2.0, 3.0);
        let b = GeoBounds::new(0.0, 1.0, 2.0, 3.0);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn validity_rejects_out_of_range() {
        assert!(LngLat::new(126.97, 37.56).is_valid());
        assert!(!LngLat::new(200.0, 0.0).is_valid());
        assert!(!LngLat::new(0.0, f64::NAN).is_valid());
    }
}
