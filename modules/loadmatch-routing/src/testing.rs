//! In-process stand-ins for the relational store, the mapping service and a
//! broken bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loadmatch_common::{Envelope, GeoPoint, LoadmatchError};
use loadmatch_events::{BusRecord, EventPublisher};

use crate::error::DirectionsError;
use crate::geometry::{DirectionsService, RouteGeometry};
use crate::store::{LoadRecord, LoadRepository, NewRoute};

#[derive(Default)]
pub struct MemoryLoadRepository {
    loads: Mutex<HashMap<String, LoadRecord>>,
    routes: Mutex<Vec<(String, NewRoute)>>,
}

impl MemoryLoadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_load(&self, load: LoadRecord) {
        self.loads.lock().unwrap().insert(load.id.clone(), load);
    }

    /// Saved routes with their assigned ids, in save order.
    pub fn routes(&self) -> Vec<(String, NewRoute)> {
        self.routes.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoadRepository for MemoryLoadRepository {
    async fn get_load(&self, load_id: &str) -> Result<Option<LoadRecord>, LoadmatchError> {
        Ok(self.loads.lock().unwrap().get(load_id).cloned())
    }

    async fn save_route(&self, route: &NewRoute) -> Result<String, LoadmatchError> {
        let mut routes = self.routes.lock().unwrap();
        let id = format!("route-{}", routes.len() + 1);
        routes.push((id.clone(), route.clone()));
        Ok(id)
    }
}

/// Answers every lookup with the same route, or the same failure.
pub struct StaticDirections {
    route: Option<RouteGeometry>,
    calls: Mutex<Vec<(GeoPoint, GeoPoint)>>,
}

impl StaticDirections {
    pub fn route(route: RouteGeometry) -> Arc<Self> {
        Arc::new(Self {
            route: Some(route),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn no_route() -> Arc<Self> {
        Arc::new(Self {
            route: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(GeoPoint, GeoPoint)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectionsService for StaticDirections {
    async fn directions(&self, origin: GeoPoint, destination: GeoPoint) -> Result<RouteGeometry, DirectionsError> {
        self.calls.lock().unwrap().push((origin, destination));
        self.route.clone().ok_or(DirectionsError::NoRoute)
    }
}

/// A bus that is always down.
pub struct UnreachablePublisher;

#[async_trait]
impl EventPublisher for UnreachablePublisher {
    async fn publish(&self, _envelope: &Envelope) -> Result<BusRecord, LoadmatchError> {
        Err(LoadmatchError::Transport("bus unreachable".into()))
    }
}
