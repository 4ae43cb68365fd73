//! Periodic resource snapshots: track occupancy and station usage into the
//! event log.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::telemetry::{EventLog, SimEventKind, SnapshotConfig, SnapshotState};
use crate::tracks::TrackCapacityManager;
use crate::workshops::WorkshopCapacityManager;

/// Schedule condition: the snapshot interval has elapsed.
pub fn should_capture_snapshot(
    clock: Option<Res<SimulationClock>>,
    config: Option<Res<SnapshotConfig>>,
    state: Option<Res<SnapshotState>>,
) -> bool {
    let (Some(clock), Some(config), Some(state)) = (clock, config, state) else {
        return false;
    };
    let Some(interval_ms) = config.interval_ms else {
        return false;
    };
    match state.last_snapshot_at {
        None => true,
        Some(last) => clock.now().saturating_sub(last) >= interval_ms,
    }
}

pub fn capture_snapshot_system(
    clock: Res<SimulationClock>,
    tracks: Res<TrackCapacityManager>,
    workshops: Res<WorkshopCapacityManager>,
    mut state: ResMut<SnapshotState>,
    mut log: ResMut<EventLog>,
) {
    let now = clock.now();
    state.last_snapshot_at = Some(now);

    let mut details = Vec::new();
    for track in tracks.tracks() {
        details.push((
            "track",
            format!("{}={:.1}/{:.1}", track.track_id, track.occupied_m, track.length_m),
        ));
    }
    for workshop in workshops.workshops() {
        details.push((
            "workshop",
            format!(
                "{}={}/{}",
                workshop.workshop_id, workshop.stations_in_use, workshop.retrofit_stations
            ),
        ));
    }
    // BTreeMap details would collapse repeated keys; number them instead.
    let numbered: Vec<(String, String)> = details
        .into_iter()
        .enumerate()
        .map(|(i, (prefix, value))| (format!("{prefix}_{i}"), value))
        .collect();
    log.records.push(crate::telemetry::EventRecord {
        timestamp: now,
        kind: SimEventKind::ResourceSnapshot,
        entity_id: "simulation".to_string(),
        details: numbered.into_iter().collect(),
    });
}
