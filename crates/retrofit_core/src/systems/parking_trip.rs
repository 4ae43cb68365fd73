//! Parking distribution coordinator: the last pipeline stage.
//!
//! Picks up wagons waiting on retrofitted staging (or, with the park-only
//! policy, straight from collection) and distributes them over parking tracks.
//! A batch is the leading run of ready wagons on the same source track. The
//! parking track is chosen for the aggregate batch length; when no track fits
//! the whole batch it is shrunk to the longest prefix that fits, and the rest
//! waits for the next trip. Coupler handling times follow the wagon: DAC for
//! retrofitted wagons, screw couplers otherwise.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut, Resource};

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Locomotive, LocomotiveStatus, Wagon, WagonStatus};
use crate::pool::LocomotivePool;
use crate::routes::RouteTable;
use crate::scenario::{BatchConfig, ProcessTimesMs};
use crate::selection::{SelectionScope, TrackSelector};
use crate::store::{Store, Waiter};
use crate::systems::{check_or_abort, set_locomotive_status, transition_or_abort};
use crate::telemetry::{AbortState, EventLog, SimEventKind};
use crate::tracks::TrackKind;

/// Wagons ready for parking, in readiness order.
#[derive(Debug, Default, Resource)]
pub struct ParkingReady(pub Store<Entity>);

#[derive(Debug, Default)]
pub enum ParkingTripPhase {
    #[default]
    Idle,
    AwaitingLocomotive {
        batch: Vec<Entity>,
        source_track: String,
    },
    ToSource {
        loco: Entity,
        batch: Vec<Entity>,
        source_track: String,
    },
    Coupling {
        loco: Entity,
        batch: Vec<Entity>,
        source_track: String,
        parking_track: String,
        travel_ms: u64,
    },
    ToParking {
        loco: Entity,
        batch: Vec<Entity>,
        parking_track: String,
    },
    Decoupling {
        loco: Entity,
        batch: Vec<Entity>,
    },
    ReturningHome {
        loco: Entity,
    },
}

#[derive(Debug, Default, Resource)]
pub struct ParkingTripCoordinator {
    pub phase: ParkingTripPhase,
}

const WAKE: Waiter = Waiter {
    kind: EventKind::ParkingTripWake,
    subject: None,
};
const STEP: Waiter = Waiter {
    kind: EventKind::ParkingTripStep,
    subject: None,
};

fn total_length_m(batch: &[Entity], wagons: &Query<&mut Wagon>) -> f64 {
    batch
        .iter()
        .filter_map(|&e| wagons.get(e).ok())
        .map(|w| w.length_m)
        .sum()
}

/// Coupler handling time for one wagon: DAC once retrofitted, screw before.
fn handling_ms(wagon: &Wagon, dac_ms: u64, screw_ms: u64) -> u64 {
    if wagon.retrofit_end_time.is_some() {
        dac_ms
    } else {
        screw_ms
    }
}

fn batch_handling_ms(batch: &[Entity], wagons: &Query<&mut Wagon>, dac_ms: u64, screw_ms: u64) -> u64 {
    batch
        .iter()
        .filter_map(|&e| wagons.get(e).ok())
        .map(|w| handling_ms(w, dac_ms, screw_ms))
        .sum()
}

fn requeue_batch(ready: &mut Store<Entity>, batch: Vec<Entity>) {
    for entity in batch.into_iter().rev() {
        ready.requeue(entity);
    }
    ready.park(WAKE);
}

#[allow(clippy::too_many_arguments)]
pub fn parking_trip_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut coordinator: ResMut<ParkingTripCoordinator>,
    mut ready: ResMut<ParkingReady>,
    mut pool: ResMut<LocomotivePool>,
    mut selector: TrackSelector,
    routes: Res<RouteTable>,
    batches: Res<BatchConfig>,
    times: Res<ProcessTimesMs>,
    mut log: ResMut<EventLog>,
    mut abort: ResMut<AbortState>,
    mut wagons: Query<&mut Wagon>,
    mut locos: Query<&mut Locomotive>,
) {
    let kind = event.0.kind;
    if kind != EventKind::ParkingTripWake && kind != EventKind::ParkingTripStep {
        return;
    }
    if abort.is_aborted() {
        return;
    }
    let now = clock.now();
    let phase = std::mem::take(&mut coordinator.phase);

    match (kind, phase) {
        (EventKind::ParkingTripWake, ParkingTripPhase::Idle) => {
            let Some(first) = ready.0.acquire(WAKE) else {
                return;
            };
            let source_track = wagons
                .get(first)
                .ok()
                .and_then(|w| w.track_id.clone())
                .unwrap_or_default();
            let cap = batches.parking.unwrap_or(usize::MAX).max(1);
            let mut batch = vec![first];
            while batch.len() < cap {
                let next = ready.0.pop_if(|&e| {
                    wagons
                        .get(e)
                        .is_ok_and(|w| w.track_id.as_deref() == Some(source_track.as_str()))
                });
                match next {
                    Some(entity) => batch.push(entity),
                    None => break,
                }
            }
            coordinator.phase = match pool.acquire(STEP) {
                Some(loco) => dispatch(
                    loco,
                    batch,
                    source_track,
                    now,
                    &mut clock,
                    &mut ready,
                    &mut pool,
                    &routes,
                    &mut log,
                    &mut locos,
                ),
                None => ParkingTripPhase::AwaitingLocomotive {
                    batch,
                    source_track,
                },
            };
        }
        (EventKind::ParkingTripWake, busy) => coordinator.phase = busy,

        (
            EventKind::ParkingTripStep,
            ParkingTripPhase::AwaitingLocomotive {
                batch,
                source_track,
            },
        ) => {
            coordinator.phase = match pool.acquire(STEP) {
                Some(loco) => dispatch(
                    loco,
                    batch,
                    source_track,
                    now,
                    &mut clock,
                    &mut ready,
                    &mut pool,
                    &routes,
                    &mut log,
                    &mut locos,
                ),
                None => ParkingTripPhase::AwaitingLocomotive {
                    batch,
                    source_track,
                },
            };
        }

        (
            EventKind::ParkingTripStep,
            ParkingTripPhase::ToSource {
                loco,
                batch,
                source_track,
            },
        ) => {
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = source_track.clone();

            // Fit the aggregate; shrink to the longest fitting prefix when no
            // single track takes the whole batch.
            let strategy = selector.strategies.parking_selection;
            let mut batch = batch;
            let mut leftovers: Vec<Entity> = Vec::new();
            let mut chosen = selector.select(
                TrackKind::Parking,
                total_length_m(&batch, &wagons),
                strategy,
                SelectionScope::Parking,
            );
            while chosen.is_none() && batch.len() > 1 {
                if let Some(dropped) = batch.pop() {
                    leftovers.push(dropped);
                }
                chosen = selector.select(
                    TrackKind::Parking,
                    total_length_m(&batch, &wagons),
                    strategy,
                    SelectionScope::Parking,
                );
            }
            let Some(parking_track) = chosen else {
                log.record_selection_failure(
                    now,
                    &loco_state.locomotive_id,
                    format!("NO_PARKING_TRACK_FITS: from {source_track}"),
                );
                for entity in leftovers.into_iter().rev() {
                    batch.push(entity);
                }
                requeue_batch(&mut ready.0, batch);
                coordinator.phase = head_home(
                    loco,
                    &mut loco_state,
                    now,
                    &mut clock,
                    &mut pool,
                    &routes,
                    &mut log,
                );
                return;
            };
            // Popped from the tail; requeue back to the front in order.
            for entity in leftovers {
                ready.0.requeue(entity);
            }

            let Some(travel_ms) = routes.duration_ms(&source_track, &parking_track) else {
                log.record_route_error(
                    now,
                    &loco_state.locomotive_id,
                    format!("no route {source_track} -> {parking_track}"),
                );
                requeue_batch(&mut ready.0, batch);
                coordinator.phase = head_home(
                    loco,
                    &mut loco_state,
                    now,
                    &mut clock,
                    &mut pool,
                    &routes,
                    &mut log,
                );
                return;
            };
            if !check_or_abort(
                selector
                    .tracks
                    .add(&parking_track, total_length_m(&batch, &wagons)),
                &mut abort,
            ) {
                return;
            }
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Coupling, &mut log);
            let couple_ms = batch_handling_ms(
                &batch,
                &wagons,
                times.dac_coupling_ms,
                times.screw_coupling_ms,
            );
            clock.schedule_in(couple_ms, EventKind::ParkingTripStep, None);
            coordinator.phase = ParkingTripPhase::Coupling {
                loco,
                batch,
                source_track,
                parking_track,
                travel_ms,
            };
        }

        (
            EventKind::ParkingTripStep,
            ParkingTripPhase::Coupling {
                loco,
                batch,
                source_track,
                parking_track,
                travel_ms,
            },
        ) => {
            let total_len = total_length_m(&batch, &wagons);
            for &entity in &batch {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                if !transition_or_abort(&mut wagon, now, WagonStatus::MovingToParking, &mut abort)
                {
                    return;
                }
                wagon.source_track_id = wagon.track_id.take();
                wagon.destination_track_id = Some(parking_track.clone());
            }
            if !check_or_abort(selector.tracks.remove(&source_track, total_len), &mut abort) {
                return;
            }
            // Retrofitted staging space was freed; a stalled workshop pickup
            // may proceed.
            let freed_staging = selector
                .tracks
                .get(&source_track)
                .is_some_and(|t| t.kind == TrackKind::Retrofitted);
            if freed_staging {
                clock.schedule_in(0, EventKind::RetrofittedTripWake, None);
            }
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Moving, &mut log);
            clock.schedule_in(travel_ms, EventKind::ParkingTripStep, None);
            coordinator.phase = ParkingTripPhase::ToParking {
                loco,
                batch,
                parking_track,
            };
        }

        (
            EventKind::ParkingTripStep,
            ParkingTripPhase::ToParking {
                loco,
                batch,
                parking_track,
            },
        ) => {
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = parking_track.clone();
            for &entity in &batch {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                wagon.track_id = Some(parking_track.clone());
                let from = wagon.source_track_id.clone().unwrap_or_default();
                let wagon_id = wagon.wagon_id.clone();
                log.record_move(now, &wagon_id, &from, &parking_track);
            }
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Decoupling, &mut log);
            let decouple_ms = batch_handling_ms(
                &batch,
                &wagons,
                times.dac_decoupling_ms,
                times.screw_decoupling_ms,
            );
            clock.schedule_in(decouple_ms, EventKind::ParkingTripStep, None);
            coordinator.phase = ParkingTripPhase::Decoupling { loco, batch };
        }

        (EventKind::ParkingTripStep, ParkingTripPhase::Decoupling { loco, batch }) => {
            for &entity in &batch {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                if !transition_or_abort(&mut wagon, now, WagonStatus::Parked, &mut abort) {
                    return;
                }
                log.record(
                    now,
                    SimEventKind::WagonParked,
                    wagon.wagon_id.clone(),
                    [("track", wagon.track_id.clone().unwrap_or_default())],
                );
            }
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            coordinator.phase = head_home(
                loco,
                &mut loco_state,
                now,
                &mut clock,
                &mut pool,
                &routes,
                &mut log,
            );
        }

        (EventKind::ParkingTripStep, ParkingTripPhase::ReturningHome { loco }) => {
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = loco_state.home_track_id.clone();
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Parking, &mut log);
            pool.release(loco, &mut clock);
            clock.schedule_in(0, EventKind::ParkingTripWake, None);
            coordinator.phase = ParkingTripPhase::Idle;
        }

        (EventKind::ParkingTripStep, ParkingTripPhase::Idle) => {}
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch(
    loco: Entity,
    batch: Vec<Entity>,
    source_track: String,
    now: u64,
    clock: &mut SimulationClock,
    ready: &mut ParkingReady,
    pool: &mut LocomotivePool,
    routes: &RouteTable,
    log: &mut EventLog,
    locos: &mut Query<&mut Locomotive>,
) -> ParkingTripPhase {
    let Ok(mut loco_state) = locos.get_mut(loco) else {
        return ParkingTripPhase::Idle;
    };
    match routes.duration_ms(&loco_state.track_id, &source_track) {
        Some(travel_ms) => {
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Moving, log);
            clock.schedule_in(travel_ms, EventKind::ParkingTripStep, None);
            ParkingTripPhase::ToSource {
                loco,
                batch,
                source_track,
            }
        }
        None => {
            log.record_route_error(
                now,
                &loco_state.locomotive_id,
                format!("no route {} -> {source_track}", loco_state.track_id),
            );
            requeue_batch(&mut ready.0, batch);
            pool.release(loco, clock);
            ParkingTripPhase::Idle
        }
    }
}

fn head_home(
    loco: Entity,
    loco_state: &mut Locomotive,
    now: u64,
    clock: &mut SimulationClock,
    pool: &mut LocomotivePool,
    routes: &RouteTable,
    log: &mut EventLog,
) -> ParkingTripPhase {
    match routes.duration_ms(&loco_state.track_id, &loco_state.home_track_id) {
        Some(travel_ms) => {
            set_locomotive_status(loco_state, now, LocomotiveStatus::Moving, log);
            clock.schedule_in(travel_ms, EventKind::ParkingTripStep, None);
            ParkingTripPhase::ReturningHome { loco }
        }
        None => {
            log.record_route_error(
                now,
                &loco_state.locomotive_id,
                format!(
                    "no route {} -> {}",
                    loco_state.track_id, loco_state.home_track_id
                ),
            );
            set_locomotive_status(loco_state, now, LocomotiveStatus::Parking, log);
            pool.release(loco, clock);
            clock.schedule_in(0, EventKind::ParkingTripWake, None);
            ParkingTripPhase::Idle
        }
    }
}
