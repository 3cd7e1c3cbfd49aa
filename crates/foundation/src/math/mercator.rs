//! Spherical Web Mercator in unit space.
//!
//! `x` and `y` are in `[0, 1]`, with `(0, 0)` at the north-west corner of the
//! world tile. Clustering runs in this space so one pixel radius at zoom `z`
//! is `radius / (extent * 2^z)` regardless of latitude.

use std::f64::consts::PI;

pub fn lng_to_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

pub fn lat_to_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

pub fn x_to_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

pub fn y_to_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}
