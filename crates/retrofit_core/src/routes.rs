//! Route lookup: precomputed moves between tracks.
//!
//! Routes come from the scenario with fixed durations; there is no
//! path-finding. The lookup key is the ordered (source, destination) pair, so
//! a reverse move needs its own route entry. A same-track "move" resolves to a
//! zero-duration route without a table entry.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;

#[derive(Debug, Clone)]
pub struct Route {
    pub route_id: String,
    pub source_track_id: String,
    pub destination_track_id: String,
    pub duration_ms: u64,
    /// Ordered track ids traversed; informational only.
    pub path: Vec<String>,
}

#[derive(Debug, Default, Resource)]
pub struct RouteTable {
    routes: Vec<Route>,
    index: HashMap<(String, String), usize>,
}

impl RouteTable {
    pub fn insert(&mut self, route: Route) {
        let key = (
            route.source_track_id.clone(),
            route.destination_track_id.clone(),
        );
        self.index.insert(key, self.routes.len());
        self.routes.push(route);
    }

    pub fn find(&self, source: &str, destination: &str) -> Option<&Route> {
        self.index
            .get(&(source.to_string(), destination.to_string()))
            .map(|&i| &self.routes[i])
    }

    /// Duration of the move `source -> destination`; zero when both are the
    /// same track, `None` when no route is declared.
    pub fn duration_ms(&self, source: &str, destination: &str) -> Option<u64> {
        if source == destination {
            return Some(0);
        }
        self.find(source, destination).map(|r| r.duration_ms)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
