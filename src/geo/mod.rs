//! Great-circle helpers for the "stores near me" query.
//!
//! SQLite has no spatial index, so candidates are pre-filtered with a
//! latitude/longitude bounding box and then measured exactly.

/// Mean Earth radius in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Inclusive coordinate range that contains every point within a radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Box around `(lng, lat)` guaranteed to contain the `radius_meters` circle.
    ///
    /// Near the poles, or when the box would cross the antimeridian, the
    /// longitude range widens to the whole globe.
    pub fn around(lng: f64, lat: f64, radius_meters: f64) -> Self {
        let dlat = radius_meters / METERS_PER_DEGREE;
        let min_lat = (lat - dlat).max(-90.0);
        let max_lat = (lat + dlat).min(90.0);

        let cos_lat = lat.to_radians().cos();
        let (min_lng, max_lng) = if cos_lat < 1e-6 || max_lat >= 90.0 || min_lat <= -90.0 {
            (-180.0, 180.0)
        } else {
            let dlng = dlat / cos_lat;
            if lng - dlng < -180.0 || lng + dlng > 180.0 {
                (-180.0, 180.0)
            } else {
                (lng - dlng, lng + dlng)
            }
        };

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }
}

/// Haversine distance between two `(lng, lat)` points in meters.
pub fn distance_meters(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lng1, lat1) = (from.0.to_radians(), from.1.to_radians());
    let (lng2, lat2) = (to.0.to_radians(), to.1.to_radians());

    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero() {
        assert_eq!(distance_meters((-79.38, 43.65), (-79.38, 43.65)), 0.0);
    }

    #[test]
    fn test_distance_known_pair() {
        // Toronto to Hamilton is roughly 58 km as the crow flies.
        let d = distance_meters((-79.3832, 43.6532), (-79.8711, 43.2557));
        assert!((55_000.0..62_000.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_bounding_box_contains_radius() {
        let center = (-79.38, 43.65);
        let bbox = BoundingBox::around(center.0, center.1, 10_000.0);

        // A point 9.9 km due north and one 9.9 km due east must be inside.
        let north_lat = center.1 + 9_900.0 / METERS_PER_DEGREE;
        assert!(north_lat <= bbox.max_lat);

        let east_lng = center.0 + 9_900.0 / (METERS_PER_DEGREE * center.1.to_radians().cos());
        assert!(east_lng <= bbox.max_lng);
        assert!(distance_meters(center, (east_lng, center.1)) < 10_000.0);
    }

    #[test]
    fn test_bounding_box_at_pole_and_antimeridian() {
        let polar = BoundingBox::around(0.0, 89.99, 10_000.0);
        assert_eq!((polar.min_lng, polar.max_lng), (-180.0, 180.0));
        assert_eq!(polar.max_lat, 90.0);

        let dateline = BoundingBox::around(179.99, 0.0, 10_000.0);
        assert_eq!((dateline.min_lng, dateline.max_lng), (-180.0, 180.0));
    }
}
