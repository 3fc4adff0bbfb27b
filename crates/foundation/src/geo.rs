/// Mean Earth radius (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic coordinates in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned geodetic box reaching `radius_m` meters out from `center`,
/// returned as (south-west, north-east) corners.
///
/// Spherical approximation; latitudes are clamped to the poles and
/// longitudes wrap at the antimeridian.
pub fn bounding_box(center: LatLon, radius_m: f64) -> (LatLon, LatLon) {
    let lat_delta = (radius_m / EARTH_RADIUS_M).to_degrees();
    let lon_scale = center.lat.to_radians().cos().max(1e-12);
    let lon_delta = (radius_m / (EARTH_RADIUS_M * lon_scale)).to_degrees();

    let sw = LatLon::new(
        (center.lat - lat_delta).max(-90.0),
        wrap_lon(center.lon - lon_delta),
    );
    let ne = LatLon::new(
        (center.lat + lat_delta).min(90.0),
        wrap_lon(center.lon + lon_delta),
    );

    (sw, ne)
}

fn wrap_lon(lon: f64) -> f64 {
    if lon < -180.0 {
        lon + 360.0
    } else if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::{EARTH_RADIUS_M, LatLon, bounding_box};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn bounding_box_is_symmetric_at_equator() {
        let center = LatLon::new(0.0, 0.0);
        let (sw, ne) = bounding_box(center, 1000.0);

        assert_close(ne.lat, -sw.lat, 1e-12);
        assert_close(ne.lon, -sw.lon, 1e-12);
        assert_close(ne.lat - sw.lat, 2.0 * (1000.0 / EARTH_RADIUS_M).to_degrees(), 1e-12);
    }

    #[test]
    fn bounding_box_stretches_longitudes_at_high_latitude() {
        let equator = bounding_box(LatLon::new(0.0, 0.0), 1000.0);
        let arctic = bounding_box(LatLon::new(70.0, 0.0), 1000.0);

        let eq_width = equator.1.lon - equator.0.lon;
        let arctic_width = arctic.1.lon - arctic.0.lon;
        assert!(arctic_width > eq_width * 2.0);
    }

    #[test]
    fn bounding_box_clamps_at_pole() {
        let (_, ne) = bounding_box(LatLon::new(89.9999, 0.0), 10_000.0);
        assert_close(ne.lat, 90.0, 1e-12);
    }

    #[test]
    fn bounding_box_wraps_at_antimeridian() {
        let (sw, ne) = bounding_box(LatLon::new(0.0, 179.9999), 10_000.0);
        assert!(sw.lon > 0.0);
        assert!(ne.lon < 0.0);
    }
}
