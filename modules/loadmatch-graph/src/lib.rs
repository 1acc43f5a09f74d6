//! Graph projection of the freight domain.
//!
//! The relational store is the system of record. This crate keeps a derived,
//! eventually-consistent property graph of loads, drivers, vehicles, carriers
//! and routes, and answers the candidate queries the optimizer runs against it.

pub mod client;
pub mod error;
pub mod migrate;
pub mod mutation;
pub mod neo4j;
pub mod store;
pub mod synchronizer;

#[cfg(feature = "test-utils")]
pub mod memory;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use error::GraphError;
pub use migrate::migrate;
pub use mutation::{GraphMutation, NodeLabel, PropValue, RelType};
pub use neo4j::Neo4jGraph;
pub use store::{CandidateQuery, GraphStore, LoadNode, CANDIDATE_LIMIT};
pub use synchronizer::{GraphSynchronizer, MutationFailure, SyncReport};

#[cfg(feature = "test-utils")]
pub use memory::MemoryGraph;
