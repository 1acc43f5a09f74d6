//! ScoringEngine: five independent factors, one weighted composite.
//!
//! Every sub-score is nominally 0-100. Vehicle suitability above 100%
//! utilization and cost efficiency with a negative carrier performance are
//! left unclamped so ranking matches historical behaviour; such values are
//! logged at debug.

use loadmatch_common::{
    CandidateTuple, LoadRequirements, RouteCandidate, SubScores, DEFAULT_HOURS_REMAINING,
};
use tracing::debug;

use crate::constraints::OptimizationConstraints;

/// Composite weights in percent, in `SubScores` field order. Sum to 100.
const WEIGHTS: [f64; 5] = [25.0, 20.0, 20.0, 20.0, 15.0];

/// Average utilization band that scores a perfect 100.
const SWEET_SPOT: (f64, f64) = (0.6, 0.9);

const AVERAGE_SPEED_MPH: f64 = 50.0;
/// Loading plus unloading.
const SERVICE_HOURS: f64 = 2.0;
const COMFORTABLE_HOS_UTILIZATION: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        candidate: &CandidateTuple,
        load: &LoadRequirements,
        constraints: &OptimizationConstraints,
    ) -> RouteCandidate {
        let scores = SubScores {
            driver_proximity_score: proximity(
                candidate.distance_miles,
                constraints.max_driver_distance_miles,
            ),
            vehicle_suitability_score: vehicle_suitability(candidate, load),
            carrier_performance_score: carrier_performance(candidate.carrier_performance),
            cost_efficiency_score: cost_efficiency(
                candidate.distance_miles,
                candidate.carrier_performance,
            ),
            timeline_feasibility_score: timeline_feasibility(
                candidate.hours_remaining,
                candidate.distance_miles,
            ),
        };

        if !in_range(&scores) {
            debug!(
                driver_id = %candidate.driver_id,
                vehicle_id = %candidate.vehicle_id,
                scores = ?scores,
                "Sub-score outside 0-100"
            );
        }

        RouteCandidate {
            candidate: candidate.clone(),
            composite_score: composite(&scores),
            scores,
        }
    }

    /// Score every candidate and sort best first. The sort is stable, so
    /// equal composites keep their incoming (nearest-first) order.
    pub fn rank(
        &self,
        candidates: &[CandidateTuple],
        load: &LoadRequirements,
        constraints: &OptimizationConstraints,
    ) -> Vec<RouteCandidate> {
        let mut scored: Vec<RouteCandidate> = candidates
            .iter()
            .map(|c| self.score(c, load, constraints))
            .collect();
        scored.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        scored
    }
}

pub fn composite(s: &SubScores) -> f64 {
    let parts = [
        s.driver_proximity_score,
        s.vehicle_suitability_score,
        s.carrier_performance_score,
        s.cost_efficiency_score,
        s.timeline_feasibility_score,
    ];
    parts.iter().zip(WEIGHTS).map(|(score, w)| score * w).sum::<f64>() / 100.0
}

/// Linear decay from 100 at the pickup to 0 at `max_distance`.
pub fn proximity(distance_miles: f64, max_distance: f64) -> f64 {
    if distance_miles > max_distance {
        return 0.0;
    }
    if max_distance <= 0.0 {
        return 100.0;
    }
    (100.0 * (1.0 - distance_miles / max_distance)).max(0.0)
}

pub fn vehicle_suitability(candidate: &CandidateTuple, load: &LoadRequirements) -> f64 {
    if candidate.capacity_weight < load.weight || candidate.capacity_volume < load.volume {
        return 0.0;
    }

    let utilization = (ratio(load.weight, candidate.capacity_weight)
        + ratio(load.volume, candidate.capacity_volume))
        / 2.0;

    let (low, high) = SWEET_SPOT;
    if (low..=high).contains(&utilization) {
        100.0
    } else if utilization < low {
        60.0 + (utilization / low) * 40.0
    } else {
        100.0 - (utilization - high) * 200.0
    }
}

fn ratio(required: f64, capacity: f64) -> f64 {
    if capacity > 0.0 {
        required / capacity
    } else {
        0.0
    }
}

pub fn carrier_performance(on_time_percentage: f64) -> f64 {
    on_time_percentage.clamp(0.0, 100.0)
}

/// Short hauls with reliable carriers.
pub fn cost_efficiency(distance_miles: f64, carrier_performance: f64) -> f64 {
    let distance_efficiency = (100.0 - distance_miles).max(0.0);
    (distance_efficiency + carrier_performance * 0.3).min(100.0)
}

pub fn timeline_feasibility(hours_remaining: Option<f64>, distance_miles: f64) -> f64 {
    let hours = hours_remaining.unwrap_or(DEFAULT_HOURS_REMAINING);
    let needed = distance_miles / AVERAGE_SPEED_MPH + SERVICE_HOURS;
    if needed > hours {
        return 0.0;
    }

    let utilization = needed / hours;
    if utilization <= COMFORTABLE_HOS_UTILIZATION {
        100.0
    } else {
        100.0 * (1.0 - utilization)
    }
}

fn in_range(s: &SubScores) -> bool {
    [
        s.driver_proximity_score,
        s.vehicle_suitability_score,
        s.carrier_performance_score,
        s.cost_efficiency_score,
        s.timeline_feasibility_score,
    ]
    .iter()
    .all(|v| (0.0..=100.0).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadmatch_common::GeoPoint;

    fn candidate(distance: f64, weight_cap: f64, volume_cap: f64) -> CandidateTuple {
        CandidateTuple {
            driver_id: "D1".into(),
            vehicle_id: "V1".into(),
            carrier_id: "C1".into(),
            distance_miles: distance,
            capacity_weight: weight_cap,
            capacity_volume: volume_cap,
            hours_remaining: None,
            driver_rating: 4.0,
            carrier_performance: 85.0,
        }
    }

    fn load(weight: f64, volume: f64) -> LoadRequirements {
        LoadRequirements {
            load_id: "L1".into(),
            pickup: GeoPoint::new(0.0, 0.0),
            delivery: GeoPoint::new(0.0, 1.0),
            weight,
            volume,
        }
    }

    #[test]
    fn composite_weights_sub_scores() {
        let scores = SubScores {
            driver_proximity_score: 80.0,
            vehicle_suitability_score: 100.0,
            carrier_performance_score: 90.0,
            cost_efficiency_score: 70.0,
            timeline_feasibility_score: 100.0,
        };
        assert_eq!(composite(&scores), 87.0);
    }

    #[test]
    fn proximity_decays_linearly_to_zero() {
        assert_eq!(proximity(0.0, 50.0), 100.0);
        assert_eq!(proximity(25.0, 50.0), 50.0);
        assert_eq!(proximity(50.0, 50.0), 0.0);
        assert_eq!(proximity(60.0, 50.0), 0.0);
    }

    #[test]
    fn vehicle_suitability_bands() {
        // Insufficient capacity.
        assert_eq!(vehicle_suitability(&candidate(0.0, 100.0, 100.0), &load(150.0, 10.0)), 0.0);
        // 75% average utilization is in the sweet spot.
        assert_eq!(vehicle_suitability(&candidate(0.0, 100.0, 100.0), &load(75.0, 75.0)), 100.0);
        // 30% scales between 60 and 100.
        assert_eq!(vehicle_suitability(&candidate(0.0, 100.0, 100.0), &load(30.0, 30.0)), 80.0);
        // 95% is penalised.
        let over = vehicle_suitability(&candidate(0.0, 100.0, 100.0), &load(95.0, 95.0));
        assert!((over - 90.0).abs() < 1e-9, "got {over}");
    }

    #[test]
    fn zero_capacity_counts_as_zero_utilization() {
        let score = vehicle_suitability(&candidate(0.0, 0.0, 0.0), &load(0.0, 0.0));
        assert_eq!(score, 60.0);
    }

    #[test]
    fn carrier_performance_is_clamped() {
        assert_eq!(carrier_performance(120.0), 100.0);
        assert_eq!(carrier_performance(-5.0), 0.0);
        assert_eq!(carrier_performance(92.5), 92.5);
    }

    #[test]
    fn cost_efficiency_caps_at_100() {
        assert_eq!(cost_efficiency(10.0, 85.0), 100.0);
        assert_eq!(cost_efficiency(90.0, 50.0), 25.0);
        assert_eq!(cost_efficiency(500.0, 50.0), 15.0);
    }

    #[test]
    fn timeline_uses_default_hours_and_penalises_tight_schedules() {
        // 100 mi -> 4h of 11h.
        assert_eq!(timeline_feasibility(None, 100.0), 100.0);
        // 100 mi -> 4h of 4.5h is 89% utilization.
        let tight = timeline_feasibility(Some(4.5), 100.0);
        assert!((tight - 100.0 * (1.0 - 4.0 / 4.5)).abs() < 1e-9);
        // Cannot finish.
        assert_eq!(timeline_feasibility(Some(3.0), 100.0), 0.0);
    }

    #[test]
    fn rank_is_descending_and_stable() {
        let engine = ScoringEngine::new();
        let constraints = OptimizationConstraints::default();
        let mut twin = candidate(20.0, 100.0, 100.0);
        twin.driver_id = "D2".into();
        let far = {
            let mut c = candidate(45.0, 100.0, 100.0);
            c.driver_id = "D3".into();
            c
        };
        let near = candidate(20.0, 100.0, 100.0);

        let ranked = engine.rank(&[far, near, twin], &load(75.0, 75.0), &constraints);
        let order: Vec<&str> = ranked.iter().map(|r| r.candidate.driver_id.as_str()).collect();
        assert_eq!(order, vec!["D1", "D2", "D3"]);
        assert_eq!(ranked[0].composite_score, ranked[1].composite_score);
    }
}
