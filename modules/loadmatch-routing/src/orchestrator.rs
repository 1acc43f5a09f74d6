//! OptimizationOrchestrator: the two optimization paths.
//!
//! `optimize` works from the relational store and always persists and emits.
//! `optimize_advanced` works from the graph projection and only reports;
//! `persist_selection` persists and emits an advanced result on request.

use std::sync::Arc;

use loadmatch_common::{
    round2, Envelope, EventType, GeoPoint, LoadRequirements, SubScores,
};
use loadmatch_common::events::RouteOptimized;
use loadmatch_events::EventPublisher;
use loadmatch_graph::GraphStore;
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

use crate::candidates::CandidateFinder;
use crate::constraints::{ConstraintsApplied, OptimizationConstraints};
use crate::error::OptimizationError;
use crate::geometry::{RouteGeometry, RouteGeometryProvider};
use crate::scoring::ScoringEngine;
use crate::store::{LoadRepository, NewRoute};

/// `source` of every envelope this module emits.
pub const EVENT_SOURCE: &str = "route-optimization";
pub const ADVANCED_METHOD: &str = "advanced_graph_based";
const DIRECTIONS_ALGORITHM: &str = "google_maps_api";
const STRAIGHT_LINE_ALGORITHM: &str = "great_circle";

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicOptimization {
    pub route_id: String,
    pub distance_miles: f64,
    pub duration_minutes: i64,
    pub optimization_score: f64,
    pub route_geometry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedOptimization {
    pub load_id: String,
    pub optimization_method: String,
    pub selected_driver_id: String,
    pub selected_vehicle_id: String,
    pub selected_carrier_id: String,
    /// Composite score of the selected candidate.
    pub optimization_score: f64,
    pub route_details: RouteGeometry,
    pub optimization_factors: SubScores,
    pub alternatives_considered: usize,
    pub constraints_applied: ConstraintsApplied,
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationFailure {
    pub error: String,
    /// Whether the caller can still fall back to the basic path.
    pub fallback_available: bool,
}

/// What callers of either path receive. Serializes as the result with
/// `success: true`, or as `{success: false, error, fallback_available}`.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationResponse<T> {
    Success(T),
    Failure(OptimizationFailure),
}

impl<T> OptimizationResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, OptimizationResponse::Success(_))
    }

    pub fn into_result(self) -> Result<T, OptimizationFailure> {
        match self {
            OptimizationResponse::Success(r) => Ok(r),
            OptimizationResponse::Failure(f) => Err(f),
        }
    }
}

impl<T: Serialize> Serialize for OptimizationResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Succeeded<'a, T> {
            success: bool,
            #[serde(flatten)]
            result: &'a T,
        }

        #[derive(Serialize)]
        struct Failed<'a> {
            success: bool,
            error: &'a str,
            fallback_available: bool,
        }

        match self {
            OptimizationResponse::Success(result) => Succeeded {
                success: true,
                result,
            }
            .serialize(serializer),
            OptimizationResponse::Failure(f) => Failed {
                success: false,
                error: &f.error,
                fallback_available: f.fallback_available,
            }
            .serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct OptimizationOrchestrator {
    graph: Arc<dyn GraphStore>,
    finder: CandidateFinder,
    scoring: ScoringEngine,
    geometry: RouteGeometryProvider,
    loads: Arc<dyn LoadRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl OptimizationOrchestrator {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        loads: Arc<dyn LoadRepository>,
        publisher: Arc<dyn EventPublisher>,
        geometry: RouteGeometryProvider,
    ) -> Self {
        Self {
            finder: CandidateFinder::new(graph.clone()),
            graph,
            scoring: ScoringEngine::new(),
            geometry,
            loads,
            publisher,
        }
    }

    // =================================================================
    // Basic path
    // =================================================================

    pub async fn optimize(
        &self,
        load_id: &str,
        vehicle_id: &str,
        driver_id: Option<&str>,
    ) -> OptimizationResponse<BasicOptimization> {
        match self.run_basic(load_id, vehicle_id, driver_id).await {
            Ok(result) => OptimizationResponse::Success(result),
            Err(e) => {
                error!(load_id, error = %e, "Route optimization failed");
                OptimizationResponse::Failure(OptimizationFailure {
                    error: e.to_string(),
                    fallback_available: false,
                })
            }
        }
    }

    /// Relational load -> geometry -> PLANNED route row -> ROUTE_OPTIMIZED.
    pub async fn run_basic(
        &self,
        load_id: &str,
        vehicle_id: &str,
        driver_id: Option<&str>,
    ) -> Result<BasicOptimization, OptimizationError> {
        let load = self
            .loads
            .get_load(load_id)
            .await?
            .ok_or_else(|| OptimizationError::NotFound(load_id.to_string()))?;

        let route = self.geometry.compute(load.pickup, load.delivery).await;
        let algorithm = if route.traffic_considered {
            DIRECTIONS_ALGORITHM
        } else {
            STRAIGHT_LINE_ALGORITHM
        };

        let route_id = self
            .save_and_emit(
                load_id,
                vehicle_id,
                driver_id,
                (load.pickup, load.delivery),
                &route,
                route.optimization_score,
                algorithm,
            )
            .await?;

        Ok(BasicOptimization {
            route_id,
            distance_miles: route.distance_miles,
            duration_minutes: route.duration_minutes,
            optimization_score: route.optimization_score,
            route_geometry: route.route_geometry,
        })
    }

    // =================================================================
    // Advanced path
    // =================================================================

    pub async fn optimize_advanced(
        &self,
        load_id: &str,
        constraints: &OptimizationConstraints,
    ) -> OptimizationResponse<AdvancedOptimization> {
        match self.run_advanced(load_id, constraints).await {
            Ok(result) => OptimizationResponse::Success(result),
            Err(e) => {
                error!(load_id, error = %e, "Advanced route optimization failed");
                OptimizationResponse::Failure(OptimizationFailure {
                    error: e.to_string(),
                    fallback_available: true,
                })
            }
        }
    }

    /// Graph load -> candidates -> scores -> best -> geometry. Persists nothing.
    pub async fn run_advanced(
        &self,
        load_id: &str,
        constraints: &OptimizationConstraints,
    ) -> Result<AdvancedOptimization, OptimizationError> {
        let node = self
            .graph
            .load(load_id)
            .await?
            .ok_or_else(|| OptimizationError::NotFound(load_id.to_string()))?;
        let load: LoadRequirements = node
            .requirements()
            .ok_or_else(|| OptimizationError::IncompleteLoad(load_id.to_string()))?;

        let candidates = self
            .finder
            .find(
                load.pickup,
                load.delivery,
                load.weight,
                load.volume,
                constraints.max_driver_distance_miles,
            )
            .await?;
        if candidates.is_empty() {
            return Err(OptimizationError::NoCandidates(load_id.to_string()));
        }

        let below_thresholds = candidates
            .iter()
            .filter(|c| {
                c.driver_rating < constraints.min_driver_rating
                    || c.carrier_performance < constraints.min_carrier_performance
            })
            .count();
        if below_thresholds > 0 {
            info!(
                load_id,
                below_thresholds,
                "Candidates below rating/performance minimums are scored, not excluded"
            );
        }

        let ranked = self.scoring.rank(&candidates, &load, constraints);
        let alternatives_considered = ranked.len();
        let Some(best) = ranked.into_iter().next() else {
            return Err(OptimizationError::NoCandidates(load_id.to_string()));
        };

        let route = self.geometry.compute(load.pickup, load.delivery).await;

        info!(
            load_id,
            driver_id = %best.candidate.driver_id,
            vehicle_id = %best.candidate.vehicle_id,
            score = round2(best.composite_score),
            alternatives_considered,
            "Advanced optimization completed"
        );

        Ok(AdvancedOptimization {
            load_id: load_id.to_string(),
            optimization_method: ADVANCED_METHOD.to_string(),
            selected_driver_id: best.candidate.driver_id,
            selected_vehicle_id: best.candidate.vehicle_id,
            selected_carrier_id: best.candidate.carrier_id,
            optimization_score: best.composite_score,
            route_details: route,
            optimization_factors: best.scores,
            alternatives_considered,
            constraints_applied: constraints.into(),
            pickup: load.pickup,
            delivery: load.delivery,
        })
    }

    /// Persist an advanced selection as a PLANNED route and emit ROUTE_OPTIMIZED.
    /// Returns the route id.
    pub async fn persist_selection(
        &self,
        load_id: &str,
        selection: &AdvancedOptimization,
    ) -> Result<String, OptimizationError> {
        self.save_and_emit(
            load_id,
            &selection.selected_vehicle_id,
            Some(&selection.selected_driver_id),
            (selection.pickup, selection.delivery),
            &selection.route_details,
            selection.optimization_score,
            ADVANCED_METHOD,
        )
        .await
    }

    // =================================================================
    // Persistence and emission
    // =================================================================

    #[allow(clippy::too_many_arguments)]
    async fn save_and_emit(
        &self,
        load_id: &str,
        vehicle_id: &str,
        driver_id: Option<&str>,
        (origin, destination): (GeoPoint, GeoPoint),
        route: &RouteGeometry,
        score: f64,
        algorithm: &str,
    ) -> Result<String, OptimizationError> {
        let route_id = self
            .loads
            .save_route(&NewRoute {
                load_id: load_id.to_string(),
                driver_id: driver_id.map(str::to_string),
                vehicle_id: vehicle_id.to_string(),
                origin,
                destination,
                geometry: route.route_geometry.clone(),
                distance_miles: route.distance_miles,
                duration_minutes: route.duration_minutes,
                optimization_score: score,
            })
            .await?;
        info!(load_id, route_id = %route_id, vehicle_id, "Saved planned route");

        let payload = RouteOptimized {
            route_id: route_id.clone(),
            load_ids: vec![load_id.to_string()],
            load_id: None,
            vehicle_id: Some(vehicle_id.to_string()),
            driver_id: driver_id.map(str::to_string),
            original_distance: Some(round2(origin.miles_to(&destination))),
            optimized_distance: Some(route.distance_miles),
            duration_minutes: Some(route.duration_minutes as f64),
            algorithm_used: Some(algorithm.to_string()),
            optimization_score: Some(score),
            traffic_considered: route.traffic_considered,
            steps_count: route.steps.len(),
        };
        self.emit(&route_id, load_id, &payload).await;

        Ok(route_id)
    }

    /// The route row is already committed, so a failed publish only logs.
    async fn emit(&self, route_id: &str, load_id: &str, payload: &RouteOptimized) {
        let envelope = match Envelope::new(EventType::RouteOptimized, EVENT_SOURCE, payload) {
            Ok(env) => env.with_correlation_id(load_id),
            Err(e) => {
                warn!(route_id, error = %e, "Could not build ROUTE_OPTIMIZED envelope");
                return;
            }
        };

        match self.publisher.publish(&envelope).await {
            Ok(_) => info!(route_id, event_id = %envelope.id, "Published ROUTE_OPTIMIZED"),
            Err(e) => warn!(route_id, error = %e, "Failed to publish ROUTE_OPTIMIZED"),
        }
    }
}
