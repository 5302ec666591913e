use crate::models::{Coordinate, FoodListing};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Anything that may carry a position. `None` means the item never matches a
/// location filter.
pub trait Located {
    fn coordinate(&self) -> Option<Coordinate>;
}

impl Located for Coordinate {
    fn coordinate(&self) -> Option<Coordinate> {
        Some(*self)
    }
}

impl Located for FoodListing {
    fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
            _ => None,
        }
    }
}

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

fn distance_from<T: Located>(item: &T, origin: Coordinate) -> Option<f64> {
    let point = item.coordinate().filter(Coordinate::is_valid)?;
    Some(haversine_km(origin, point))
}

/// Every located item paired with its distance from `origin`, nearest first.
pub fn sort_by_distance<T: Located>(items: Vec<T>, origin: Coordinate) -> Vec<(T, f64)> {
    if !origin.is_valid() {
        tracing::warn!(?origin, "ignoring distance sort from an invalid origin");
        return Vec::new();
    }

    let mut located: Vec<(T, f64)> = items
        .into_iter()
        .filter_map(|item| distance_from(&item, origin).map(|distance| (item, distance)))
        .collect();

    located.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    located
}

/// Items no further than `radius_km` from `origin`, nearest first.
pub fn within_radius<T: Located>(items: Vec<T>, origin: Coordinate, radius_km: f64) -> Vec<(T, f64)> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        tracing::warn!(radius_km, "ignoring location filter with an invalid radius");
        return Vec::new();
    }

    sort_by_distance(items, origin)
        .into_iter()
        .filter(|(_, distance)| *distance <= radius_km)
        .collect()
}
