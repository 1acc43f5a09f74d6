use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Geo ---

pub const METERS_PER_MILE: f64 = 1609.34;

/// WGS-84 equatorial radius, the same constant the graph store uses for
/// `point.distance`, so in-process and in-graph distances agree.
pub const EARTH_RADIUS_METERS: f64 = 6_378_140.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn miles_to(&self, other: &GeoPoint) -> f64 {
        haversine_miles(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Haversine great-circle distance between two lat/lng points in miles.
pub fn haversine_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_METERS * c / METERS_PER_MILE
}

/// Round to two decimal places, the precision distances and scores are reported at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// --- Statuses ---

pub mod status {
    pub const AVAILABLE: &str = "AVAILABLE";
    pub const PENDING: &str = "PENDING";
    pub const ASSIGNED: &str = "ASSIGNED";
    pub const PICKED_UP: &str = "PICKED_UP";
    pub const IN_TRANSIT: &str = "IN_TRANSIT";
    pub const DELIVERED: &str = "DELIVERED";
    pub const CANCELLED: &str = "CANCELLED";
    /// Route node state set at optimization time.
    pub const ACTIVE: &str = "ACTIVE";
    /// Terminal route node state.
    pub const COMPLETED: &str = "COMPLETED";
    /// Relational route row state written by the basic optimizer.
    pub const PLANNED: &str = "PLANNED";
}

// --- Candidates ---

pub const DEFAULT_DRIVER_RATING: f64 = 4.0;
pub const DEFAULT_CARRIER_PERFORMANCE: f64 = 85.0;
/// Full regulatory drive window, assumed when a driver reports no hours.
pub const DEFAULT_HOURS_REMAINING: f64 = 11.0;

/// A driver + vehicle + carrier combination eligible for a load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateTuple {
    pub driver_id: String,
    pub vehicle_id: String,
    pub carrier_id: String,
    /// Great-circle distance from the driver to the pickup point.
    pub distance_miles: f64,
    pub capacity_weight: f64,
    pub capacity_volume: f64,
    pub hours_remaining: Option<f64>,
    pub driver_rating: f64,
    /// Carrier on-time percentage, 0-100.
    pub carrier_performance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubScores {
    pub driver_proximity_score: f64,
    pub vehicle_suitability_score: f64,
    pub carrier_performance_score: f64,
    pub cost_efficiency_score: f64,
    pub timeline_feasibility_score: f64,
}

/// A scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteCandidate {
    #[serde(flatten)]
    pub candidate: CandidateTuple,
    pub scores: SubScores,
    pub composite_score: f64,
}

/// What a load asks of a vehicle, resolved from the graph's Load node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoadRequirements {
    pub load_id: String,
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
    pub weight: f64,
    pub volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_longitude_on_the_equator() {
        let d = haversine_miles(0.0, 0.0, 0.0, 1.0);
        assert!((d - 69.17).abs() < 0.01, "got {d}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let dallas = GeoPoint::new(32.7767, -96.7970);
        let nyc = GeoPoint::new(40.7128, -74.0060);
        assert_eq!(dallas.miles_to(&dallas), 0.0);
        assert!((dallas.miles_to(&nyc) - nyc.miles_to(&dallas)).abs() < 1e-9);
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(69.17054), 69.17);
        assert_eq!(round2(12.3456), 12.35);
    }
}
