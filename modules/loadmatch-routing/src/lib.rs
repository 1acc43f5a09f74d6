//! Candidate search, scoring, route geometry and the optimization paths built on them.

pub mod candidates;
pub mod constraints;
pub mod directions;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod polyline;
pub mod scoring;
pub mod store;
#[cfg(feature = "test-support")]
pub mod testing;

pub use candidates::CandidateFinder;
pub use constraints::{ConstraintsApplied, OptimizationConstraints};
pub use directions::GoogleDirections;
pub use error::{DirectionsError, OptimizationError};
pub use geometry::{straight_line, DirectionsService, RouteGeometry, RouteGeometryProvider, RouteStep};
pub use orchestrator::{
    AdvancedOptimization, BasicOptimization, OptimizationFailure, OptimizationOrchestrator,
    OptimizationResponse,
};
pub use scoring::ScoringEngine;
pub use store::{LoadRecord, LoadRepository, NewRoute, PgLoadRepository};
