//! MemoryGraph: in-process `GraphStore` with Neo4j's merge semantics.
//!
//! Used by tests across the workspace so projection and candidate search can
//! be exercised without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use loadmatch_common::{
    status, CandidateTuple, GeoPoint, DEFAULT_CARRIER_PERFORMANCE, DEFAULT_DRIVER_RATING,
};

use crate::error::GraphError;
use crate::mutation::{GraphMutation, NodeLabel, PropValue, Props, RelType};
use crate::store::{CandidateQuery, GraphStore, LoadNode, CANDIDATE_LIMIT};

pub type PropMap = BTreeMap<&'static str, PropValue>;

#[derive(Default)]
struct State {
    nodes: HashMap<(NodeLabel, String), PropMap>,
    /// (rel, from, to) -> edge props. One entry per edge, so at most one edge per triple.
    edges: BTreeMap<(RelType, String, String), PropMap>,
    applied: usize,
}

#[derive(Default)]
pub struct MemoryGraph {
    state: Mutex<State>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn node(&self, label: NodeLabel, id: &str) -> Option<PropMap> {
        self.lock().nodes.get(&(label, id.to_string())).cloned()
    }

    pub fn node_count(&self, label: NodeLabel) -> usize {
        self.lock().nodes.keys().filter(|(l, _)| *l == label).count()
    }

    pub fn has_edge(&self, rel: RelType, from: &str, to: &str) -> bool {
        self.lock()
            .edges
            .contains_key(&(rel, from.to_string(), to.to_string()))
    }

    pub fn edge_count(&self, rel: RelType) -> usize {
        self.lock().edges.keys().filter(|(r, _, _)| *r == rel).count()
    }

    pub fn edge(&self, rel: RelType, from: &str, to: &str) -> Option<PropMap> {
        self.lock()
            .edges
            .get(&(rel, from.to_string(), to.to_string()))
            .cloned()
    }

    /// Mutations applied so far, including ones that matched nothing.
    pub fn applied(&self) -> usize {
        self.lock().applied
    }
}

fn write_props(target: &mut PropMap, props: &Props) {
    for (key, value) in props {
        target.insert(*key, value.clone());
    }
}

fn float(props: &PropMap, key: &str) -> Option<f64> {
    props.get(key).and_then(PropValue::as_f64)
}

fn text<'a>(props: &'a PropMap, key: &str) -> Option<&'a str> {
    props.get(key).and_then(PropValue::as_str)
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn apply(&self, mutation: &GraphMutation) -> Result<(), GraphError> {
        let mut state = self.lock();
        state.applied += 1;

        match mutation {
            GraphMutation::MergeNode { label, id, props } => {
                let node = state.nodes.entry((*label, id.clone())).or_default();
                write_props(node, props);
            }
            GraphMutation::SetProps { label, id, props } => {
                if let Some(node) = state.nodes.get_mut(&(*label, id.clone())) {
                    write_props(node, props);
                }
            }
            GraphMutation::MergeEdge { rel, from, to, props } => {
                let (a, b) = rel.endpoints();
                let ends_exist = state.nodes.contains_key(&(a, from.clone()))
                    && state.nodes.contains_key(&(b, to.clone()));
                if ends_exist {
                    let edge = state
                        .edges
                        .entry((*rel, from.clone(), to.clone()))
                        .or_default();
                    write_props(edge, props);
                }
            }
            GraphMutation::RemoveEdgesTo { rel, to } => {
                state.edges.retain(|(r, _, t), _| !(r == rel && t == to));
            }
        }
        Ok(())
    }

    async fn load(&self, load_id: &str) -> Result<Option<LoadNode>, GraphError> {
        let state = self.lock();
        let Some(props) = state.nodes.get(&(NodeLabel::Load, load_id.to_string())) else {
            return Ok(None);
        };

        let point = |lat: &str, lng: &str| Some(GeoPoint::new(float(props, lat)?, float(props, lng)?));
        Ok(Some(LoadNode {
            id: load_id.to_string(),
            status: text(props, "status").map(str::to_string),
            pickup: point("pickup_lat", "pickup_lng"),
            delivery: point("delivery_lat", "delivery_lng"),
            weight: float(props, "weight"),
            volume: float(props, "volume"),
        }))
    }

    async fn find_candidates(&self, q: &CandidateQuery) -> Result<Vec<CandidateTuple>, GraphError> {
        let state = self.lock();
        let node = |label: NodeLabel, id: &str| state.nodes.get(&(label, id.to_string()));
        let available = |props: &PropMap| text(props, "status") == Some(status::AVAILABLE);

        let mut out = Vec::new();
        for (drives, driver_id, vehicle_id) in state.edges.keys() {
            if *drives != RelType::DRIVES {
                continue;
            }
            let (Some(driver), Some(vehicle)) =
                (node(NodeLabel::Driver, driver_id), node(NodeLabel::Vehicle, vehicle_id))
            else {
                continue;
            };
            if !available(driver) || !available(vehicle) {
                continue;
            }
            let (Some(lat), Some(lng)) = (float(driver, "latitude"), float(driver, "longitude")) else {
                continue;
            };

            let distance_miles = GeoPoint::new(lat, lng).miles_to(&q.pickup);
            let capacity_weight = float(vehicle, "capacity_weight").unwrap_or(0.0);
            let capacity_volume = float(vehicle, "capacity_volume").unwrap_or(0.0);
            if distance_miles > q.max_distance_miles
                || capacity_weight < q.weight_required
                || capacity_volume < q.volume_required
            {
                continue;
            }

            for (owned_by, owned_vehicle, carrier_id) in state.edges.keys() {
                if *owned_by != RelType::OWNED_BY || owned_vehicle != vehicle_id {
                    continue;
                }
                let Some(carrier) = node(NodeLabel::Carrier, carrier_id) else {
                    continue;
                };
                out.push(CandidateTuple {
                    driver_id: driver_id.clone(),
                    vehicle_id: vehicle_id.clone(),
                    carrier_id: carrier_id.clone(),
                    distance_miles,
                    capacity_weight,
                    capacity_volume,
                    hours_remaining: float(driver, "hours_remaining"),
                    driver_rating: float(driver, "rating").unwrap_or(DEFAULT_DRIVER_RATING),
                    carrier_performance: float(carrier, "on_time_percentage")
                        .unwrap_or(DEFAULT_CARRIER_PERFORMANCE),
                });
            }
        }

        out.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));
        out.truncate(CANDIDATE_LIMIT);
        Ok(out)
    }
}
