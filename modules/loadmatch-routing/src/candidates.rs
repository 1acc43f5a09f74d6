use std::sync::Arc;

use loadmatch_common::{CandidateTuple, GeoPoint};
use loadmatch_graph::{CandidateQuery, GraphError, GraphStore};
use tracing::info;

/// Eligible driver/vehicle/carrier tuples for a pickup, read from the graph.
#[derive(Clone)]
pub struct CandidateFinder {
    graph: Arc<dyn GraphStore>,
}

impl CandidateFinder {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Nearest first, at most ten. No match is an empty list, not an error.
    /// `delivery` does not affect eligibility.
    pub async fn find(
        &self,
        pickup: GeoPoint,
        delivery: GeoPoint,
        weight_required: f64,
        volume_required: f64,
        max_distance_miles: f64,
    ) -> Result<Vec<CandidateTuple>, GraphError> {
        let query = CandidateQuery {
            pickup,
            weight_required,
            volume_required,
            max_distance_miles,
        };
        let found = self.graph.find_candidates(&query).await?;
        info!(
            count = found.len(),
            pickup = ?pickup,
            delivery = ?delivery,
            max_distance_miles,
            "Found candidate driver/vehicle combinations"
        );
        Ok(found)
    }
}
