use serde::{Deserialize, Serialize};

/// Knobs for the graph-based optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConstraints {
    pub max_driver_distance_miles: f64,
    /// HOS drive window.
    pub max_route_duration_hours: f64,
    pub min_driver_rating: f64,
    pub min_carrier_performance: f64,
    pub consider_traffic: bool,
    pub allow_multi_load: bool,
    pub max_loads_per_route: u32,
}

impl Default for OptimizationConstraints {
    fn default() -> Self {
        Self {
            max_driver_distance_miles: 50.0,
            max_route_duration_hours: 11.0,
            min_driver_rating: 3.0,
            min_carrier_performance: 70.0,
            consider_traffic: true,
            allow_multi_load: false,
            max_loads_per_route: 3,
        }
    }
}

/// The subset of constraints echoed back in an advanced result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintsApplied {
    pub max_driver_distance: f64,
    pub max_route_duration: f64,
    pub min_driver_rating: f64,
    pub min_carrier_performance: f64,
}

impl From<&OptimizationConstraints> for ConstraintsApplied {
    fn from(c: &OptimizationConstraints) -> Self {
        Self {
            max_driver_distance: c.max_driver_distance_miles,
            max_route_duration: c.max_route_duration_hours,
            min_driver_rating: c.min_driver_rating,
            min_carrier_performance: c.min_carrier_performance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let c: OptimizationConstraints =
            serde_json::from_str(r#"{"max_driver_distance_miles": 75}"#).unwrap();
        assert_eq!(c.max_driver_distance_miles, 75.0);
        assert_eq!(c.max_route_duration_hours, 11.0);
        assert_eq!(c.max_loads_per_route, 3);
        assert!(c.consider_traffic);
    }
}
