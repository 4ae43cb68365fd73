//! Scenario input: the typed, validated description of one simulation run.
//!
//! A `Scenario` is produced by an external loader (JSON in the CLI crate) and
//! is read-only once the world is built. `validate` performs every referential
//! and range check up front, so the core never starts a run on bad input.
//!
//! All scenario durations and timestamps are fractional **minutes**; they are
//! converted to simulation milliseconds once, in [`build::build_scenario`].

pub mod build;

use std::collections::HashSet;

use bevy_ecs::prelude::Resource;

use crate::clock::minutes_to_ms;
use crate::selection::{TrackSelectionStrategy, WorkshopSelectionStrategy};
use crate::tracks::TrackKind;

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TrackConfig {
    pub track_id: String,
    pub kind: TrackKind,
    pub length_m: f64,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RouteConfig {
    pub route_id: String,
    pub source_track_id: String,
    pub destination_track_id: String,
    pub duration_minutes: f64,
    #[serde(default)]
    pub path: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct WorkshopConfig {
    pub workshop_id: String,
    pub track_id: String,
    pub retrofit_stations: u32,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct LocomotiveConfig {
    pub locomotive_id: String,
    pub home_track_id: String,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct WagonConfig {
    pub wagon_id: String,
    pub length_m: f64,
    #[serde(default)]
    pub is_loaded: bool,
    #[serde(default = "default_true")]
    pub needs_retrofit: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TrainConfig {
    pub train_id: String,
    /// Absolute arrival time in minutes; must lie within the scenario window.
    pub arrival_time: f64,
    pub wagons: Vec<WagonConfig>,
}

/// Handling durations in fractional minutes.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize, serde::Serialize)]
pub struct ProcessTimes {
    pub wagon_retrofit_time: f64,
    #[serde(default)]
    pub train_to_hump_delay: f64,
    #[serde(default)]
    pub wagon_hump_interval: f64,
    #[serde(default)]
    pub screw_coupling_time: f64,
    #[serde(default)]
    pub screw_decoupling_time: f64,
    #[serde(default)]
    pub dac_coupling_time: f64,
    #[serde(default)]
    pub dac_decoupling_time: f64,
    #[serde(default)]
    pub wagon_to_station_time: f64,
}

impl ProcessTimes {
    pub fn to_ms(self) -> ProcessTimesMs {
        ProcessTimesMs {
            wagon_retrofit_ms: minutes_to_ms(self.wagon_retrofit_time),
            train_to_hump_delay_ms: minutes_to_ms(self.train_to_hump_delay),
            wagon_hump_interval_ms: minutes_to_ms(self.wagon_hump_interval),
            screw_coupling_ms: minutes_to_ms(self.screw_coupling_time),
            screw_decoupling_ms: minutes_to_ms(self.screw_decoupling_time),
            dac_coupling_ms: minutes_to_ms(self.dac_coupling_time),
            dac_decoupling_ms: minutes_to_ms(self.dac_decoupling_time),
            wagon_to_station_ms: minutes_to_ms(self.wagon_to_station_time),
        }
    }

    fn values(&self) -> [(&'static str, f64); 8] {
        [
            ("wagon_retrofit_time", self.wagon_retrofit_time),
            ("train_to_hump_delay", self.train_to_hump_delay),
            ("wagon_hump_interval", self.wagon_hump_interval),
            ("screw_coupling_time", self.screw_coupling_time),
            ("screw_decoupling_time", self.screw_decoupling_time),
            ("dac_coupling_time", self.dac_coupling_time),
            ("dac_decoupling_time", self.dac_decoupling_time),
            ("wagon_to_station_time", self.wagon_to_station_time),
        ]
    }
}

/// Handling durations converted to simulation milliseconds.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct ProcessTimesMs {
    pub wagon_retrofit_ms: u64,
    pub train_to_hump_delay_ms: u64,
    pub wagon_hump_interval_ms: u64,
    pub screw_coupling_ms: u64,
    pub screw_decoupling_ms: u64,
    pub dac_coupling_ms: u64,
    pub dac_decoupling_ms: u64,
    pub wagon_to_station_ms: u64,
}

/// Simulation horizon in milliseconds. The runner stops once the next event
/// would be at or past this timestamp.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationEndTimeMs(pub u64);

/// Selection strategies per operation. Collection and both staging selections
/// use `track_selection`; parking has its own strategy, workshops theirs.
#[derive(Debug, Clone, Copy, Resource)]
pub struct StrategyConfig {
    pub track_selection: TrackSelectionStrategy,
    pub workshop_selection: WorkshopSelectionStrategy,
    pub parking_selection: TrackSelectionStrategy,
}

/// Batch size caps for the three pickup coordinators; `None` means "all
/// currently ready / the whole train".
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct BatchConfig {
    pub collection: Option<usize>,
    pub retrofitted: Option<usize>,
    pub parking: Option<usize>,
}

fn default_track_strategy() -> TrackSelectionStrategy {
    TrackSelectionStrategy::LeastOccupied
}

fn default_workshop_strategy() -> WorkshopSelectionStrategy {
    WorkshopSelectionStrategy::FirstAvailable
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Scenario {
    /// Absolute start of the simulated window, minutes.
    pub start_time: f64,
    /// Absolute end (horizon), minutes.
    pub end_time: f64,
    #[serde(default)]
    pub random_seed: u64,
    #[serde(default = "default_track_strategy")]
    pub track_selection_strategy: TrackSelectionStrategy,
    #[serde(default = "default_workshop_strategy")]
    pub workshop_selection_strategy: WorkshopSelectionStrategy,
    #[serde(default = "default_track_strategy")]
    pub parking_selection_strategy: TrackSelectionStrategy,
    #[serde(default)]
    pub retrofit_loaded_wagons: bool,
    #[serde(default)]
    pub park_non_retrofit_wagons: bool,
    #[serde(default)]
    pub collection_batch_size: Option<usize>,
    #[serde(default)]
    pub retrofitted_batch_size: Option<usize>,
    #[serde(default)]
    pub parking_batch_size: Option<usize>,
    #[serde(default)]
    pub snapshot_interval_minutes: Option<f64>,
    pub tracks: Vec<TrackConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub workshops: Vec<WorkshopConfig>,
    #[serde(default)]
    pub locomotives: Vec<LocomotiveConfig>,
    pub process_times: ProcessTimes,
    #[serde(default)]
    pub trains: Vec<TrainConfig>,
}

impl Default for Scenario {
    /// An empty eight-hour window with default strategies; useful as a test
    /// and documentation baseline.
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 480.0,
            random_seed: 0,
            track_selection_strategy: default_track_strategy(),
            workshop_selection_strategy: default_workshop_strategy(),
            parking_selection_strategy: default_track_strategy(),
            retrofit_loaded_wagons: false,
            park_non_retrofit_wagons: false,
            collection_batch_size: None,
            retrofitted_batch_size: None,
            parking_batch_size: None,
            snapshot_interval_minutes: None,
            tracks: Vec::new(),
            routes: Vec::new(),
            workshops: Vec::new(),
            locomotives: Vec::new(),
            process_times: ProcessTimes::default(),
            trains: Vec::new(),
        }
    }
}

impl Scenario {
    /// Horizon length in minutes.
    pub fn sim_minutes(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.end_time <= self.start_time {
            return Err(ScenarioError::EmptyWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }

        let mut track_ids = HashSet::new();
        for track in &self.tracks {
            if !track_ids.insert(track.track_id.as_str()) {
                return Err(ScenarioError::DuplicateId {
                    entity: "track",
                    id: track.track_id.clone(),
                });
            }
            if track.length_m <= 0.0 {
                return Err(ScenarioError::NonPositiveLength {
                    entity: "track",
                    id: track.track_id.clone(),
                    length_m: track.length_m,
                });
            }
        }

        let mut route_ids = HashSet::new();
        let mut route_pairs = HashSet::new();
        for route in &self.routes {
            if !route_ids.insert(route.route_id.as_str()) {
                return Err(ScenarioError::DuplicateId {
                    entity: "route",
                    id: route.route_id.clone(),
                });
            }
            for endpoint in [&route.source_track_id, &route.destination_track_id] {
                if !track_ids.contains(endpoint.as_str()) {
                    return Err(ScenarioError::UnknownTrack {
                        referenced_by: format!("route {}", route.route_id),
                        track_id: endpoint.clone(),
                    });
                }
            }
            if route.duration_minutes < 0.0 {
                return Err(ScenarioError::NegativeDuration {
                    entity: format!("route {}", route.route_id),
                    minutes: route.duration_minutes,
                });
            }
            if !route_pairs.insert((
                route.source_track_id.as_str(),
                route.destination_track_id.as_str(),
            )) {
                return Err(ScenarioError::DuplicateRoutePair {
                    source: route.source_track_id.clone(),
                    destination: route.destination_track_id.clone(),
                });
            }
        }

        let mut workshop_ids = HashSet::new();
        let mut workshop_tracks = HashSet::new();
        for workshop in &self.workshops {
            if !workshop_ids.insert(workshop.workshop_id.as_str()) {
                return Err(ScenarioError::DuplicateId {
                    entity: "workshop",
                    id: workshop.workshop_id.clone(),
                });
            }
            let track = self
                .tracks
                .iter()
                .find(|t| t.track_id == workshop.track_id)
                .ok_or_else(|| ScenarioError::UnknownTrack {
                    referenced_by: format!("workshop {}", workshop.workshop_id),
                    track_id: workshop.track_id.clone(),
                })?;
            if track.kind != TrackKind::Workshop {
                return Err(ScenarioError::NotAWorkshopTrack {
                    workshop_id: workshop.workshop_id.clone(),
                    track_id: workshop.track_id.clone(),
                });
            }
            if workshop.retrofit_stations < 1 {
                return Err(ScenarioError::NoStations {
                    workshop_id: workshop.workshop_id.clone(),
                });
            }
            if !workshop_tracks.insert(workshop.track_id.as_str()) {
                return Err(ScenarioError::SharedWorkshopTrack {
                    track_id: workshop.track_id.clone(),
                });
            }
        }

        let mut locomotive_ids = HashSet::new();
        for locomotive in &self.locomotives {
            if !locomotive_ids.insert(locomotive.locomotive_id.as_str()) {
                return Err(ScenarioError::DuplicateId {
                    entity: "locomotive",
                    id: locomotive.locomotive_id.clone(),
                });
            }
            if !track_ids.contains(locomotive.home_track_id.as_str()) {
                return Err(ScenarioError::UnknownTrack {
                    referenced_by: format!("locomotive {}", locomotive.locomotive_id),
                    track_id: locomotive.home_track_id.clone(),
                });
            }
        }

        let mut train_ids = HashSet::new();
        let mut wagon_ids = HashSet::new();
        for train in &self.trains {
            if !train_ids.insert(train.train_id.as_str()) {
                return Err(ScenarioError::DuplicateId {
                    entity: "train",
                    id: train.train_id.clone(),
                });
            }
            if train.arrival_time < self.start_time || train.arrival_time > self.end_time {
                return Err(ScenarioError::ArrivalOutsideWindow {
                    train_id: train.train_id.clone(),
                    arrival_time: train.arrival_time,
                });
            }
            for wagon in &train.wagons {
                if !wagon_ids.insert(wagon.wagon_id.as_str()) {
                    return Err(ScenarioError::DuplicateId {
                        entity: "wagon",
                        id: wagon.wagon_id.clone(),
                    });
                }
                if wagon.length_m <= 0.0 {
                    return Err(ScenarioError::NonPositiveLength {
                        entity: "wagon",
                        id: wagon.wagon_id.clone(),
                        length_m: wagon.length_m,
                    });
                }
            }
        }

        for (name, minutes) in self.process_times.values() {
            if minutes < 0.0 {
                return Err(ScenarioError::NegativeDuration {
                    entity: name.to_string(),
                    minutes,
                });
            }
        }

        Ok(())
    }
}

/// Configuration errors surfaced before the simulation is built.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioError {
    EmptyWindow {
        start: f64,
        end: f64,
    },
    DuplicateId {
        entity: &'static str,
        id: String,
    },
    UnknownTrack {
        referenced_by: String,
        track_id: String,
    },
    NotAWorkshopTrack {
        workshop_id: String,
        track_id: String,
    },
    SharedWorkshopTrack {
        track_id: String,
    },
    NoStations {
        workshop_id: String,
    },
    NonPositiveLength {
        entity: &'static str,
        id: String,
        length_m: f64,
    },
    NegativeDuration {
        entity: String,
        minutes: f64,
    },
    DuplicateRoutePair {
        source: String,
        destination: String,
    },
    ArrivalOutsideWindow {
        train_id: String,
        arrival_time: f64,
    },
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::EmptyWindow { start, end } => {
                write!(f, "end_time {end} must be after start_time {start}")
            }
            ScenarioError::DuplicateId { entity, id } => {
                write!(f, "duplicate {entity} id {id}")
            }
            ScenarioError::UnknownTrack {
                referenced_by,
                track_id,
            } => write!(f, "{referenced_by} references unknown track {track_id}"),
            ScenarioError::NotAWorkshopTrack {
                workshop_id,
                track_id,
            } => write!(
                f,
                "workshop {workshop_id} references track {track_id} which is not a WORKSHOP track"
            ),
            ScenarioError::SharedWorkshopTrack { track_id } => {
                write!(f, "more than one workshop on track {track_id}")
            }
            ScenarioError::NoStations { workshop_id } => {
                write!(f, "workshop {workshop_id} must have at least one station")
            }
            ScenarioError::NonPositiveLength {
                entity,
                id,
                length_m,
            } => write!(f, "{entity} {id} has non-positive length {length_m}"),
            ScenarioError::NegativeDuration { entity, minutes } => {
                write!(f, "{entity} has negative duration {minutes}")
            }
            ScenarioError::DuplicateRoutePair {
                source,
                destination,
            } => write!(f, "duplicate route {source} -> {destination}"),
            ScenarioError::ArrivalOutsideWindow {
                train_id,
                arrival_time,
            } => write!(
                f,
                "train {train_id} arrives at {arrival_time}, outside the simulated window"
            ),
        }
    }
}

impl std::error::Error for ScenarioError {}
