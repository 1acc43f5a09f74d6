//! The seam between the projection/optimizer and the graph database.

use async_trait::async_trait;
use loadmatch_common::{CandidateTuple, GeoPoint, LoadRequirements};

use crate::error::GraphError;
use crate::mutation::GraphMutation;

/// Most candidates a single lookup returns.
pub const CANDIDATE_LIMIT: usize = 10;

/// Eligibility filter for a candidate lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub pickup: GeoPoint,
    pub weight_required: f64,
    pub volume_required: f64,
    pub max_distance_miles: f64,
}

/// A Load node as materialized by the projection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadNode {
    pub id: String,
    pub status: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub delivery: Option<GeoPoint>,
    pub weight: Option<f64>,
    pub volume: Option<f64>,
}

impl LoadNode {
    /// Requirements for candidate search. `None` when the node lacks
    /// pickup or delivery coordinates. Missing weight/volume count as zero.
    pub fn requirements(&self) -> Option<LoadRequirements> {
        Some(LoadRequirements {
            load_id: self.id.clone(),
            pickup: self.pickup?,
            delivery: self.delivery?,
            weight: self.weight.unwrap_or(0.0),
            volume: self.volume.unwrap_or(0.0),
        })
    }
}

/// Graph operations the rest of the system depends on.
///
/// Implemented by `Neo4jGraph` (production) and `MemoryGraph` (tests).
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn apply(&self, mutation: &GraphMutation) -> Result<(), GraphError>;

    async fn load(&self, load_id: &str) -> Result<Option<LoadNode>, GraphError>;

    /// AVAILABLE driver -DRIVES-> AVAILABLE vehicle -OWNED_BY-> carrier tuples
    /// within range and capacity, nearest first, at most `CANDIDATE_LIMIT`.
    async fn find_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateTuple>, GraphError>;
}
