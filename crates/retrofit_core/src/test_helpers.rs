//! Shared fixtures for unit tests: a canonical single-line pipeline topology.

#![allow(dead_code)]

use crate::scenario::{
    LocomotiveConfig, ProcessTimes, RouteConfig, Scenario, TrackConfig, TrainConfig, WagonConfig,
    WorkshopConfig,
};
use crate::selection::TrackSelectionStrategy;
use crate::tracks::TrackKind;

/// One track of each pipeline stage plus a locomotive depot, 100m each.
pub fn standard_tracks() -> Vec<TrackConfig> {
    [
        ("depot", TrackKind::ResourceParking),
        ("col-1", TrackKind::Collection),
        ("ret-1", TrackKind::Retrofit),
        ("ws-1", TrackKind::Workshop),
        ("fin-1", TrackKind::Retrofitted),
        ("park-1", TrackKind::Parking),
    ]
    .into_iter()
    .map(|(id, kind)| TrackConfig {
        track_id: id.to_string(),
        kind,
        length_m: 100.0,
    })
    .collect()
}

/// Routes between every ordered pair of tracks, all with the same duration.
pub fn all_pairs_routes(tracks: &[TrackConfig], duration_minutes: f64) -> Vec<RouteConfig> {
    let mut routes = Vec::new();
    for source in tracks {
        for destination in tracks {
            if source.track_id == destination.track_id {
                continue;
            }
            routes.push(RouteConfig {
                route_id: format!("{}-{}", source.track_id, destination.track_id),
                source_track_id: source.track_id.clone(),
                destination_track_id: destination.track_id.clone(),
                duration_minutes,
                path: vec![],
            });
        }
    }
    routes
}

/// The canonical happy-path setup: one track per stage, one workshop with one
/// station, one locomotive, all routes one minute, ten-minute retrofits and
/// zero handling times.
pub fn single_wagon_scenario() -> Scenario {
    let tracks = standard_tracks();
    let routes = all_pairs_routes(&tracks, 1.0);
    Scenario {
        end_time: 480.0,
        track_selection_strategy: TrackSelectionStrategy::FirstAvailable,
        parking_selection_strategy: TrackSelectionStrategy::FirstAvailable,
        tracks,
        routes,
        workshops: vec![WorkshopConfig {
            workshop_id: "w1".to_string(),
            track_id: "ws-1".to_string(),
            retrofit_stations: 1,
        }],
        locomotives: vec![LocomotiveConfig {
            locomotive_id: "loco-1".to_string(),
            home_track_id: "depot".to_string(),
        }],
        process_times: ProcessTimes {
            wagon_retrofit_time: 10.0,
            ..Default::default()
        },
        trains: vec![TrainConfig {
            train_id: "t1".to_string(),
            arrival_time: 0.0,
            wagons: vec![WagonConfig {
                wagon_id: "t1-w1".to_string(),
                length_m: 20.0,
                is_loaded: false,
                needs_retrofit: true,
            }],
        }],
        ..Default::default()
    }
}
