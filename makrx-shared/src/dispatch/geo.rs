/// Great-circle distance

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two `(latitude, longitude)` points in degrees
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(haversine_km((12.97, 77.59), (12.97, 77.59)), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // Bengaluru to Mumbai, roughly 845 km
        let d = haversine_km((12.9716, 77.5946), (19.0760, 72.8777));
        assert!((d - 845.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_km((0.0, 0.0), (1.0, 0.0));
        assert!((d - 111.19).abs() < 0.1, "got {d}");
    }

    #[test]
    fn test_symmetric() {
        let a = (28.6139, 77.2090);
        let b = (13.0827, 80.2707);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }
}
