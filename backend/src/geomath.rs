use crate::models::TrackPoint;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(a: TrackPoint, b: TrackPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).max(0.0).sqrt())
}

/// Running arc-length along `path`; `out[0] == 0` and `out.len() == path.len()`.
pub fn cumulative_distances_m(path: &[TrackPoint]) -> Vec<f64> {
    let mut distances = Vec::with_capacity(path.len());
    let mut total = 0.0;
    if !path.is_empty() {
        distances.push(0.0);
    }
    for pair in path.windows(2) {
        total += haversine_m(pair[0], pair[1]);
        distances.push(total);
    }
    distances
}

pub fn path_length_m(path: &[TrackPoint]) -> f64 {
    path.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let point = TrackPoint::new(45.0, 5.0);
        assert_eq!(haversine_m(point, point), 0.0);
    }

    #[test]
    fn one_km_north() {
        let dist = haversine_m(TrackPoint::new(45.0, 5.0), TrackPoint::new(45.009, 5.0));
        assert!((dist - 1000.0).abs() < 10.0);
    }

    #[test]
    fn paris_to_london() {
        let dist = haversine_m(
            TrackPoint::new(48.8566, 2.3522),
            TrackPoint::new(51.5074, -0.1278),
        );
        assert!((dist - 343_000.0).abs() < 5_000.0);
    }

    #[test]
    fn path_length_of_short_paths_is_zero() {
        assert_eq!(path_length_m(&[]), 0.0);
        assert_eq!(path_length_m(&[TrackPoint::new(45.0, 5.0)]), 0.0);
    }

    #[test]
    fn cumulative_matches_total() {
        let path = vec![
            TrackPoint::new(45.0, 5.0),
            TrackPoint::new(45.01, 5.0),
            TrackPoint::new(45.01, 5.02),
        ];
        let cumulative = cumulative_distances_m(&path);
        assert_eq!(cumulative.len(), 3);
        assert_eq!(cumulative[0], 0.0);
        assert!((cumulative[2] - path_length_m(&path)).abs() < 1e-9);
    }

    #[test]
    fn cumulative_of_empty_path() {
        assert!(cumulative_distances_m(&[]).is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn valid_point() -> impl Strategy<Value = TrackPoint> {
            (-90.0..=90.0, -180.0..=180.0).prop_map(|(lat, lon)| TrackPoint { lat, lon })
        }

        proptest! {
            #[test]
            fn prop_haversine_symmetric(a in valid_point(), b in valid_point()) {
                prop_assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-6);
            }

            #[test]
            fn prop_haversine_bounded_by_half_circumference(a in valid_point(), b in valid_point()) {
                let dist = haversine_m(a, b);
                prop_assert!(dist >= 0.0);
                prop_assert!(dist <= std::f64::consts::PI * EARTH_RADIUS_M + 1.0);
            }

            #[test]
            fn prop_cumulative_is_monotonic(path in prop::collection::vec(valid_point(), 1..20)) {
                let cumulative = cumulative_distances_m(&path);
                prop_assert_eq!(cumulative.len(), path.len());
                for w in cumulative.windows(2) {
                    prop_assert!(w[1] >= w[0]);
                }
            }
        }
    }
}
