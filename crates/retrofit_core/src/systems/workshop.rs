//! Workshop coordinator: assigns waiting wagons to free retrofit stations.
//!
//! Wagons decoupled onto retrofit staging wait in a FIFO queue. Whenever a
//! `StationAssign` fires (new wagons, or a station freed), the queue is
//! drained while a workshop with a free station exists. Assignment moves the
//! wagon's length from the retrofit track to the workshop track; the explicit
//! two-step move (wait on track, then travel to the station) costs
//! `wagon_to_station_time` before the retrofit itself begins.

use std::collections::VecDeque;

use bevy_ecs::prelude::{Entity, Query, Res, ResMut, Resource};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Wagon, WagonStatus};
use crate::scenario::{ProcessTimesMs, StrategyConfig};
use crate::selection::select_workshop;
use crate::systems::retrofitted_trip::RetrofittedReady;
use crate::systems::{check_or_abort, transition_or_abort};
use crate::telemetry::{AbortState, EventLog, SimEventKind};
use crate::tracks::TrackCapacityManager;
use crate::workshops::WorkshopCapacityManager;

/// Wagons waiting on retrofit staging, in arrival order.
#[derive(Debug, Default, Resource)]
pub struct RetrofitQueue(pub VecDeque<Entity>);

/// Drains the retrofit queue onto free stations.
#[allow(clippy::too_many_arguments)]
pub fn station_assign_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut queue: ResMut<RetrofitQueue>,
    mut workshops: ResMut<WorkshopCapacityManager>,
    mut tracks: ResMut<TrackCapacityManager>,
    strategies: Res<StrategyConfig>,
    times: Res<ProcessTimesMs>,
    mut abort: ResMut<AbortState>,
    mut wagons: Query<&mut Wagon>,
) {
    if event.0.kind != EventKind::StationAssign {
        return;
    }
    if abort.is_aborted() {
        return;
    }
    let now = clock.now();

    loop {
        let Some(workshop_idx) = select_workshop(&workshops, strategies.workshop_selection) else {
            break;
        };
        let Some(entity) = queue.0.pop_front() else {
            break;
        };
        let Ok(mut wagon) = wagons.get_mut(entity) else {
            continue;
        };

        let workshop_track = workshops
            .get(workshop_idx)
            .map(|w| w.track_id.clone())
            .unwrap_or_default();
        if !check_or_abort(workshops.occupy(workshop_idx, now), &mut abort) {
            return;
        }
        let waited_ms = now.saturating_sub(wagon.retrofit_track_arrival_time.unwrap_or(now));
        if let Some(workshop) = workshops.get_mut(workshop_idx) {
            workshop.total_waiting_ms += waited_ms;
        }

        let from_track = wagon.track_id.clone().unwrap_or_default();
        if !check_or_abort(tracks.remove(&from_track, wagon.length_m), &mut abort) {
            return;
        }
        // Station capacity is the throughput gate; the workshop track itself
        // may exceed its nominal length while wagons sit at stations.
        if !check_or_abort(tracks.add_overflow(&workshop_track, wagon.length_m), &mut abort) {
            return;
        }
        wagon.source_track_id = Some(from_track);
        wagon.track_id = Some(workshop_track);
        if !transition_or_abort(&mut wagon, now, WagonStatus::MovingToStation, &mut abort) {
            return;
        }
        clock.schedule_in(
            times.wagon_to_station_ms,
            EventKind::WagonAtStation,
            Some(EventSubject::Wagon(entity)),
        );
        // Space was freed on the retrofit track; a stalled pickup may proceed.
        clock.schedule_in(0, EventKind::CollectionTripWake, None);
    }
}

/// The wagon reached its station: the retrofit begins.
pub fn wagon_at_station_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    workshops: Res<WorkshopCapacityManager>,
    times: Res<ProcessTimesMs>,
    mut log: ResMut<EventLog>,
    mut abort: ResMut<AbortState>,
    mut wagons: Query<&mut Wagon>,
) {
    if event.0.kind != EventKind::WagonAtStation {
        return;
    }
    let Some(EventSubject::Wagon(entity)) = event.0.subject else {
        return;
    };
    let Ok(mut wagon) = wagons.get_mut(entity) else {
        return;
    };
    let now = clock.now();

    if !transition_or_abort(&mut wagon, now, WagonStatus::Retrofitting, &mut abort) {
        return;
    }
    let from = wagon.source_track_id.clone().unwrap_or_default();
    let to = wagon.track_id.clone().unwrap_or_default();
    let wagon_id = wagon.wagon_id.clone();
    log.record_move(now, &wagon_id, &from, &to);
    let workshop_id = workshops
        .index_by_track(&to)
        .and_then(|i| workshops.get(i))
        .map(|w| w.workshop_id.clone())
        .unwrap_or_default();
    log.record(
        now,
        SimEventKind::RetrofitStarted,
        wagon_id,
        [("workshop", workshop_id)],
    );
    clock.schedule_in(
        times.wagon_retrofit_ms,
        EventKind::RetrofitFinished,
        Some(EventSubject::Wagon(entity)),
    );
}

/// Retrofit time elapsed: free the station and stage the wagon for pickup.
pub fn retrofit_finished_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut workshops: ResMut<WorkshopCapacityManager>,
    mut ready: ResMut<RetrofittedReady>,
    mut log: ResMut<EventLog>,
    mut abort: ResMut<AbortState>,
    mut wagons: Query<&mut Wagon>,
) {
    if event.0.kind != EventKind::RetrofitFinished {
        return;
    }
    let Some(EventSubject::Wagon(entity)) = event.0.subject else {
        return;
    };
    let Ok(mut wagon) = wagons.get_mut(entity) else {
        return;
    };
    let now = clock.now();

    if !transition_or_abort(&mut wagon, now, WagonStatus::Retrofitted, &mut abort) {
        return;
    }
    let track = wagon.track_id.clone().unwrap_or_default();
    let Some(workshop_idx) = workshops.index_by_track(&track) else {
        abort.fail(format!(
            "wagon {} finished retrofit on {track} which has no workshop",
            wagon.wagon_id
        ));
        return;
    };
    if !check_or_abort(workshops.release(workshop_idx, now), &mut abort) {
        return;
    }
    let retrofit_ms = wagon
        .retrofit_end_time
        .unwrap_or(now)
        .saturating_sub(wagon.retrofit_start_time.unwrap_or(now));
    let Some(workshop) = workshops.get_mut(workshop_idx) else {
        return;
    };
    workshop.completed_retrofits += 1;
    workshop.total_retrofit_ms += retrofit_ms;
    log.record(
        now,
        SimEventKind::RetrofitCompleted,
        wagon.wagon_id.clone(),
        [("workshop", workshop.workshop_id.clone())],
    );

    ready.0.put(entity, &mut clock);
    // The freed station can take the next waiting wagon.
    clock.schedule_in(0, EventKind::StationAssign, None);
}
