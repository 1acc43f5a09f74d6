//! RouteGeometryProvider: mapping-service route with a great-circle fallback.

use std::sync::Arc;

use async_trait::async_trait;
use loadmatch_common::{round2, GeoPoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DirectionsError;
use crate::polyline::linestring;

/// Score given to every fallback route.
pub const FALLBACK_SCORE: f64 = 50.0;
/// Minutes per mile in the fallback (30 mph).
const FALLBACK_MINUTES_PER_MILE: f64 = 2.0;
const FALLBACK_TRAFFIC_MINUTES_PER_MILE: f64 = 2.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance: String,
    pub duration: String,
    pub maneuver: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    pub distance_miles: f64,
    pub duration_minutes: i64,
    pub duration_in_traffic_minutes: i64,
    /// WKT `LINESTRING`, lng/lat order.
    pub route_geometry: String,
    pub encoded_polyline: Option<String>,
    pub steps: Vec<RouteStep>,
    pub optimization_score: f64,
    pub traffic_considered: bool,
}

/// An external driving-directions source.
#[async_trait]
pub trait DirectionsService: Send + Sync {
    async fn directions(&self, origin: GeoPoint, destination: GeoPoint) -> Result<RouteGeometry, DirectionsError>;
}

#[derive(Clone, Default)]
pub struct RouteGeometryProvider {
    directions: Option<Arc<dyn DirectionsService>>,
}

impl RouteGeometryProvider {
    pub fn new(directions: Option<Arc<dyn DirectionsService>>) -> Self {
        if directions.is_none() {
            warn!("No directions service configured, routes use straight-line geometry");
        }
        Self { directions }
    }

    /// Never fails: any directions error yields `straight_line`.
    pub async fn compute(&self, pickup: GeoPoint, delivery: GeoPoint) -> RouteGeometry {
        let Some(directions) = &self.directions else {
            debug!("Directions unavailable, using straight line");
            return straight_line(pickup, delivery);
        };

        match directions.directions(pickup, delivery).await {
            Ok(route) => route,
            Err(e) => {
                warn!(error = %e, "Directions lookup failed, falling back to straight line");
                straight_line(pickup, delivery)
            }
        }
    }
}

pub fn straight_line(pickup: GeoPoint, delivery: GeoPoint) -> RouteGeometry {
    let distance = round2(pickup.miles_to(&delivery));
    RouteGeometry {
        distance_miles: distance,
        duration_minutes: (distance * FALLBACK_MINUTES_PER_MILE).round() as i64,
        duration_in_traffic_minutes: (distance * FALLBACK_TRAFFIC_MINUTES_PER_MILE).round() as i64,
        route_geometry: linestring(&[pickup, delivery]),
        encoded_polyline: None,
        steps: Vec::new(),
        optimization_score: FALLBACK_SCORE,
        traffic_considered: false,
    }
}

/// 70 minus the traffic overrun percentage (at most 30 off), kept in [10, 100].
pub fn traffic_score(duration_secs: f64, traffic_secs: f64) -> f64 {
    let mut score = 70.0;
    if duration_secs > 0.0 && traffic_secs > duration_secs {
        score -= ((traffic_secs - duration_secs) / duration_secs * 100.0).min(30.0);
    }
    round2(score.clamp(10.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl DirectionsService for Failing {
        async fn directions(&self, _: GeoPoint, _: GeoPoint) -> Result<RouteGeometry, DirectionsError> {
            Err(DirectionsError::Api {
                status: 403,
                message: "OVER_QUERY_LIMIT".into(),
            })
        }
    }

    #[test]
    fn straight_line_one_degree_on_the_equator() {
        let route = straight_line(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        assert_eq!(route.distance_miles, 69.17);
        assert_eq!(route.duration_minutes, 138);
        assert_eq!(route.duration_in_traffic_minutes, 173);
        assert_eq!(route.optimization_score, 50.0);
        assert!(!route.traffic_considered);
        assert!(route.steps.is_empty());
        assert_eq!(route.route_geometry, "LINESTRING(0 0, 1 0)");
    }

    #[test]
    fn traffic_score_penalises_overrun() {
        assert_eq!(traffic_score(600.0, 600.0), 70.0);
        assert_eq!(traffic_score(600.0, 660.0), 60.0);
        assert_eq!(traffic_score(600.0, 1800.0), 40.0);
        assert_eq!(traffic_score(600.0, 300.0), 70.0);
    }

    #[tokio::test]
    async fn failures_and_missing_service_fall_back() {
        let (a, b) = (GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        let expected = straight_line(a, b);

        let failing = RouteGeometryProvider::new(Some(Arc::new(Failing)));
        assert_eq!(failing.compute(a, b).await, expected);

        let missing = RouteGeometryProvider::new(None);
        assert_eq!(missing.compute(a, b).await, expected);
    }
}
