//! Scenario builders for integration tests: a single-line pipeline topology
//! with all-pairs routes, mutated per test.

use retrofit_core::scenario::{
    LocomotiveConfig, ProcessTimes, RouteConfig, Scenario, TrackConfig, TrainConfig, WagonConfig,
    WorkshopConfig,
};
use retrofit_core::selection::TrackSelectionStrategy;
use retrofit_core::tracks::TrackKind;

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

pub fn wagon(wagon_id: &str, length_m: f64, is_loaded: bool, needs_retrofit: bool) -> WagonConfig {
    WagonConfig {
        wagon_id: wagon_id.to_string(),
        length_m,
        is_loaded,
        needs_retrofit,
    }
}

pub fn train(train_id: &str, arrival_time: f64, wagons: Vec<WagonConfig>) -> TrainConfig {
    TrainConfig {
        train_id: train_id.to_string(),
        arrival_time,
        wagons,
    }
}

/// The canonical pipeline: one track per stage, one workshop with one
/// station, one locomotive at the depot, all routes one minute, ten-minute
/// retrofits and zero handling times. Eight-hour window.
pub fn pipeline_scenario(trains: Vec<TrainConfig>) -> Scenario {
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
        trains,
        ..Default::default()
    }
}

/// Single eligible 20m wagon arriving at time zero.
pub fn single_wagon_scenario() -> Scenario {
    pipeline_scenario(vec![train("t1", 0.0, vec![wagon("t1-w1", 20.0, false, true)])])
}

/// Change the length of one track in place.
pub fn set_track_length(scenario: &mut Scenario, track_id: &str, length_m: f64) {
    if let Some(track) = scenario
        .tracks
        .iter_mut()
        .find(|t| t.track_id == track_id)
    {
        track.length_m = length_m;
    }
}
