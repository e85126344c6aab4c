//! Web Mercator, geodetic and local model-frame conversions.
//!
//! Mercator coordinates are unit-square: x grows east from the antimeridian,
//! y grows south from the north pole, both in [0, 1] at zoom 0.

use std::f64::consts::PI;

use crate::config::SETTINGS;
use crate::point::Point;

pub fn mercator_from_lat_lon_rad(lat: f64, lon: f64, z: f64) -> Point {
    let x = lon / (2.0 * PI) + 0.5;
    let y = 0.5 - lat.tan().asinh() / (2.0 * PI);
    Point::new(x, y, z)
}

pub fn mercator_from_lat_lon_deg(lat: f64, lon: f64, z: f64) -> Point {
    mercator_from_lat_lon_rad(lat.to_radians(), lon.to_radians(), z)
}

pub fn mercator_to_lat_rad(p: &Point) -> f64 {
    let s = (0.5 - p.y) * 2.0 * PI;
    s.sinh().atan()
}

pub fn mercator_to_lon_rad(p: &Point) -> f64 {
    (p.x - 0.5) * 2.0 * PI
}

pub fn mercator_to_lat_deg(p: &Point) -> f64 {
    mercator_to_lat_rad(p).to_degrees()
}

pub fn mercator_to_lon_deg(p: &Point) -> f64 {
    mercator_to_lon_rad(p).to_degrees()
}

/// Transform a Mercator point (z = meters above the ellipsoid) into the local
/// Cartesian frame anchored at `origin`, which maps to (0, 0, 0).
pub fn mercator_to_model(p: &Point, origin: &Point) -> Point {
    if SETTINGS.use_earth_curvature {
        spherical_to_model(p, origin, SETTINGS.earth_radius)
    } else {
        flat_to_model(p, origin, SETTINGS.earth_radius)
    }
}

/// Exact inverse of [`mercator_to_model`].
pub fn mercator_from_model(p: &Point, origin: &Point) -> Point {
    if SETTINGS.use_earth_curvature {
        spherical_from_model(p, origin, SETTINGS.earth_radius)
    } else {
        flat_from_model(p, origin, SETTINGS.earth_radius)
    }
}

// The Earth is approximated as a sphere (instead of an ellipsoid). The unit
// vector of (lat, lon) is rotated so that the origin lands on (0, -1, 0),
// scaled by 1 + z/R, and the origin is dropped to z = 0.
fn spherical_to_model(p: &Point, origin: &Point, radius: f64) -> Point {
    let lat = mercator_to_lat_rad(p);
    let lon = mercator_to_lon_rad(p);
    let lat_orig = mercator_to_lat_rad(origin);
    let lon_orig = mercator_to_lon_rad(origin);

    let dlon = lon - lon_orig;
    let x = lat.cos() * dlon.sin();
    let y = -lat.cos() * dlon.cos();
    let z = lat.sin();

    let mut q = Point::new(
        x,
        lat_orig.sin() * y + lat_orig.cos() * z,
        -lat_orig.cos() * y + lat_orig.sin() * z,
    );

    q *= 1.0 + p.z / radius;
    q.z -= 1.0;
    q * radius
}

fn spherical_from_model(p: &Point, origin: &Point, radius: f64) -> Point {
    let mut q = *p / radius;
    q.z += 1.0;
    let r = q.dist3().sqrt();
    let zz = (r - 1.0) * radius;
    q /= r;

    let lat_orig = mercator_to_lat_rad(origin);
    let lon_orig = mercator_to_lon_rad(origin);

    let x = q.x;
    let y = lat_orig.sin() * q.y - lat_orig.cos() * q.z;
    let z = lat_orig.cos() * q.y + lat_orig.sin() * q.z;

    let lat = z.asin();
    let dlon = x.atan2(-y);
    let lon = lon_orig + dlon;

    mercator_from_lat_lon_rad(lat, lon, zz)
}

// Locally flat model: uniform scale at the origin latitude, y axis flipped to
// a direct frame.
fn flat_to_model(p: &Point, origin: &Point, radius: f64) -> Point {
    let scale = 2.0 * PI * radius * mercator_to_lat_rad(origin).cos();
    let mut q = *p - *origin;
    q.x *= scale;
    q.y *= -scale;
    q
}

fn flat_from_model(p: &Point, origin: &Point, radius: f64) -> Point {
    let scale = 2.0 * PI * radius * mercator_to_lat_rad(origin).cos();
    let mut q = *p;
    q.x /= scale;
    q.y /= -scale;
    q + *origin
}
