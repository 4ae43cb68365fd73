//! Pickup-retrofitted coordinator: moves finished wagons from workshop tracks
//! to retrofitted staging.
//!
//! Batches are the leading run of ready wagons on the same workshop track,
//! optionally capped. Wagons carry digital couplers now, so DAC handling times
//! apply. Failure handling mirrors the pickup-to-retrofit coordinator: the
//! batch goes back to the front of the ready queue and the next wake retries.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut, Resource};

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Locomotive, LocomotiveStatus, Wagon, WagonStatus};
use crate::pool::LocomotivePool;
use crate::routes::RouteTable;
use crate::scenario::{BatchConfig, ProcessTimesMs};
use crate::selection::{SelectionScope, TrackSelector};
use crate::store::{Store, Waiter};
use crate::systems::parking_trip::ParkingReady;
use crate::systems::{check_or_abort, set_locomotive_status, transition_or_abort};
use crate::telemetry::{AbortState, EventLog};
use crate::tracks::TrackKind;

/// Retrofitted wagons awaiting pickup from their workshop track.
#[derive(Debug, Default, Resource)]
pub struct RetrofittedReady(pub Store<Entity>);

#[derive(Debug, Default)]
pub enum RetrofittedTripPhase {
    #[default]
    Idle,
    AwaitingLocomotive {
        batch: Vec<Entity>,
        workshop_track: String,
    },
    ToWorkshop {
        loco: Entity,
        batch: Vec<Entity>,
        workshop_track: String,
    },
    Coupling {
        loco: Entity,
        batch: Vec<Entity>,
        workshop_track: String,
        staging_track: String,
        travel_ms: u64,
    },
    ToStaging {
        loco: Entity,
        batch: Vec<Entity>,
        staging_track: String,
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
pub struct RetrofittedTripCoordinator {
    pub phase: RetrofittedTripPhase,
}

const WAKE: Waiter = Waiter {
    kind: EventKind::RetrofittedTripWake,
    subject: None,
};
const STEP: Waiter = Waiter {
    kind: EventKind::RetrofittedTripStep,
    subject: None,
};

fn total_length_m(batch: &[Entity], wagons: &Query<&mut Wagon>) -> f64 {
    batch
        .iter()
        .filter_map(|&e| wagons.get(e).ok())
        .map(|w| w.length_m)
        .sum()
}

/// Hand a batch back to the front of the ready queue, preserving order.
fn requeue_batch(ready: &mut Store<Entity>, batch: Vec<Entity>) {
    for entity in batch.into_iter().rev() {
        ready.requeue(entity);
    }
    ready.park(WAKE);
}

#[allow(clippy::too_many_arguments)]
pub fn retrofitted_trip_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut coordinator: ResMut<RetrofittedTripCoordinator>,
    mut ready: ResMut<RetrofittedReady>,
    mut parking_ready: ResMut<ParkingReady>,
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
    if kind != EventKind::RetrofittedTripWake && kind != EventKind::RetrofittedTripStep {
        return;
    }
    if abort.is_aborted() {
        return;
    }
    let now = clock.now();
    let phase = std::mem::take(&mut coordinator.phase);

    match (kind, phase) {
        (EventKind::RetrofittedTripWake, RetrofittedTripPhase::Idle) => {
            let Some(first) = ready.0.acquire(WAKE) else {
                return;
            };
            let workshop_track = wagons
                .get(first)
                .ok()
                .and_then(|w| w.track_id.clone())
                .unwrap_or_default();
            let cap = batches.retrofitted.unwrap_or(usize::MAX).max(1);
            let mut batch = vec![first];
            while batch.len() < cap {
                let next = ready.0.pop_if(|&e| {
                    wagons
                        .get(e)
                        .is_ok_and(|w| w.track_id.as_deref() == Some(workshop_track.as_str()))
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
                    workshop_track,
                    now,
                    &mut clock,
                    &mut ready,
                    &mut pool,
                    &routes,
                    &mut log,
                    &mut locos,
                ),
                None => RetrofittedTripPhase::AwaitingLocomotive {
                    batch,
                    workshop_track,
                },
            };
        }
        (EventKind::RetrofittedTripWake, busy) => coordinator.phase = busy,

        (
            EventKind::RetrofittedTripStep,
            RetrofittedTripPhase::AwaitingLocomotive {
                batch,
                workshop_track,
            },
        ) => {
            coordinator.phase = match pool.acquire(STEP) {
                Some(loco) => dispatch(
                    loco,
                    batch,
                    workshop_track,
                    now,
                    &mut clock,
                    &mut ready,
                    &mut pool,
                    &routes,
                    &mut log,
                    &mut locos,
                ),
                None => RetrofittedTripPhase::AwaitingLocomotive {
                    batch,
                    workshop_track,
                },
            };
        }

        (
            EventKind::RetrofittedTripStep,
            RetrofittedTripPhase::ToWorkshop {
                loco,
                batch,
                workshop_track,
            },
        ) => {
            let total_len = total_length_m(&batch, &wagons);
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = workshop_track.clone();

            let strategy = selector.strategies.track_selection;
            let chosen = selector.select(
                TrackKind::Retrofitted,
                total_len,
                strategy,
                SelectionScope::RetrofittedStaging,
            );
            let staging_track = match chosen {
                Some(track) => track,
                None => {
                    log.record_selection_failure(
                        now,
                        &loco_state.locomotive_id,
                        format!("NO_RETROFITTED_TRACK_FITS: {total_len}m from {workshop_track}"),
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
                }
            };
            let Some(travel_ms) = routes.duration_ms(&workshop_track, &staging_track) else {
                log.record_route_error(
                    now,
                    &loco_state.locomotive_id,
                    format!("no route {workshop_track} -> {staging_track}"),
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
            if !check_or_abort(selector.tracks.add(&staging_track, total_len), &mut abort) {
                return;
            }
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Coupling, &mut log);
            let couple_ms = times.dac_coupling_ms * batch.len() as u64;
            clock.schedule_in(couple_ms, EventKind::RetrofittedTripStep, None);
            coordinator.phase = RetrofittedTripPhase::Coupling {
                loco,
                batch,
                workshop_track,
                staging_track,
                travel_ms,
            };
        }

        (
            EventKind::RetrofittedTripStep,
            RetrofittedTripPhase::Coupling {
                loco,
                batch,
                workshop_track,
                staging_track,
                travel_ms,
            },
        ) => {
            let total_len = total_length_m(&batch, &wagons);
            for &entity in &batch {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                if !transition_or_abort(&mut wagon, now, WagonStatus::Moving, &mut abort) {
                    return;
                }
                wagon.source_track_id = wagon.track_id.take();
                wagon.destination_track_id = Some(staging_track.clone());
            }
            if !check_or_abort(selector.tracks.remove(&workshop_track, total_len), &mut abort) {
                return;
            }
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Moving, &mut log);
            clock.schedule_in(travel_ms, EventKind::RetrofittedTripStep, None);
            coordinator.phase = RetrofittedTripPhase::ToStaging {
                loco,
                batch,
                staging_track,
            };
        }

        (
            EventKind::RetrofittedTripStep,
            RetrofittedTripPhase::ToStaging {
                loco,
                batch,
                staging_track,
            },
        ) => {
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = staging_track.clone();
            for &entity in &batch {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                wagon.track_id = Some(staging_track.clone());
                if !transition_or_abort(&mut wagon, now, WagonStatus::Retrofitted, &mut abort) {
                    return;
                }
                let from = wagon.source_track_id.clone().unwrap_or_default();
                let wagon_id = wagon.wagon_id.clone();
                log.record_move(now, &wagon_id, &from, &staging_track);
            }
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Decoupling, &mut log);
            let decouple_ms = times.dac_decoupling_ms * batch.len() as u64;
            clock.schedule_in(decouple_ms, EventKind::RetrofittedTripStep, None);
            coordinator.phase = RetrofittedTripPhase::Decoupling { loco, batch };
        }

        (EventKind::RetrofittedTripStep, RetrofittedTripPhase::Decoupling { loco, batch }) => {
            for entity in batch {
                parking_ready.0.put(entity, &mut clock);
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

        (EventKind::RetrofittedTripStep, RetrofittedTripPhase::ReturningHome { loco }) => {
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = loco_state.home_track_id.clone();
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Parking, &mut log);
            pool.release(loco, &mut clock);
            clock.schedule_in(0, EventKind::RetrofittedTripWake, None);
            coordinator.phase = RetrofittedTripPhase::Idle;
        }

        (EventKind::RetrofittedTripStep, RetrofittedTripPhase::Idle) => {}
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch(
    loco: Entity,
    batch: Vec<Entity>,
    workshop_track: String,
    now: u64,
    clock: &mut SimulationClock,
    ready: &mut RetrofittedReady,
    pool: &mut LocomotivePool,
    routes: &RouteTable,
    log: &mut EventLog,
    locos: &mut Query<&mut Locomotive>,
) -> RetrofittedTripPhase {
    let Ok(mut loco_state) = locos.get_mut(loco) else {
        return RetrofittedTripPhase::Idle;
    };
    match routes.duration_ms(&loco_state.track_id, &workshop_track) {
        Some(travel_ms) => {
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Moving, log);
            clock.schedule_in(travel_ms, EventKind::RetrofittedTripStep, None);
            RetrofittedTripPhase::ToWorkshop {
                loco,
                batch,
                workshop_track,
            }
        }
        None => {
            log.record_route_error(
                now,
                &loco_state.locomotive_id,
                format!("no route {} -> {workshop_track}", loco_state.track_id),
            );
            requeue_batch(&mut ready.0, batch);
            pool.release(loco, clock);
            RetrofittedTripPhase::Idle
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
) -> RetrofittedTripPhase {
    match routes.duration_ms(&loco_state.track_id, &loco_state.home_track_id) {
        Some(travel_ms) => {
            set_locomotive_status(loco_state, now, LocomotiveStatus::Moving, log);
            clock.schedule_in(travel_ms, EventKind::RetrofittedTripStep, None);
            RetrofittedTripPhase::ReturningHome { loco }
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
            clock.schedule_in(0, EventKind::RetrofittedTripWake, None);
            RetrofittedTripPhase::Idle
        }
    }
}
