//! Pickup-to-retrofit coordinator: moves humped wagon batches from collection
//! tracks to retrofit staging.
//!
//! A single long-running task realized as a phase machine: wake events start a
//! trip when a batch and a locomotive are available; step events advance the
//! trip through drive/couple/drive/decouple/return. Wagons are pre-retrofit,
//! so screw coupling times apply. On a missing route or a full retrofit
//! staging area the trip is abandoned: the batch goes back to the front of the
//! queue, the locomotive returns to the pool, and the next wake retries.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut, Resource};

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Locomotive, LocomotiveStatus, Wagon, WagonStatus};
use crate::pool::LocomotivePool;
use crate::routes::RouteTable;
use crate::scenario::ProcessTimesMs;
use crate::selection::{SelectionScope, TrackSelector};
use crate::store::{Store, Waiter};
use crate::systems::workshop::RetrofitQueue;
use crate::systems::{check_or_abort, set_locomotive_status, transition_or_abort};
use crate::telemetry::{AbortState, EventLog};
use crate::tracks::TrackKind;

/// Wagons of one train humped onto one collection track, picked up as a unit.
#[derive(Debug, Clone)]
pub struct CollectionBatch {
    pub track_id: String,
    pub wagons: Vec<Entity>,
}

/// Batches awaiting pickup, in formation order.
#[derive(Debug, Default, Resource)]
pub struct CollectionReady(pub Store<CollectionBatch>);

#[derive(Debug, Default)]
pub enum CollectionTripPhase {
    #[default]
    Idle,
    AwaitingLocomotive {
        batch: CollectionBatch,
    },
    ToCollection {
        loco: Entity,
        batch: CollectionBatch,
    },
    Coupling {
        loco: Entity,
        batch: CollectionBatch,
        retrofit_track: String,
        travel_ms: u64,
    },
    ToRetrofit {
        loco: Entity,
        batch: CollectionBatch,
        retrofit_track: String,
    },
    Decoupling {
        loco: Entity,
        batch: CollectionBatch,
        retrofit_track: String,
    },
    ReturningHome {
        loco: Entity,
    },
}

#[derive(Debug, Default, Resource)]
pub struct CollectionTripCoordinator {
    pub phase: CollectionTripPhase,
}

const WAKE: Waiter = Waiter {
    kind: EventKind::CollectionTripWake,
    subject: None,
};
const STEP: Waiter = Waiter {
    kind: EventKind::CollectionTripStep,
    subject: None,
};

fn batch_length_m(batch: &CollectionBatch, wagons: &Query<&mut Wagon>) -> f64 {
    batch
        .wagons
        .iter()
        .filter_map(|&e| wagons.get(e).ok())
        .map(|w| w.length_m)
        .sum()
}

#[allow(clippy::too_many_arguments)]
pub fn collection_trip_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut coordinator: ResMut<CollectionTripCoordinator>,
    mut ready: ResMut<CollectionReady>,
    mut pool: ResMut<LocomotivePool>,
    mut selector: TrackSelector,
    mut retrofit_queue: ResMut<RetrofitQueue>,
    routes: Res<RouteTable>,
    times: Res<ProcessTimesMs>,
    mut log: ResMut<EventLog>,
    mut abort: ResMut<AbortState>,
    mut wagons: Query<&mut Wagon>,
    mut locos: Query<&mut Locomotive>,
) {
    let kind = event.0.kind;
    if kind != EventKind::CollectionTripWake && kind != EventKind::CollectionTripStep {
        return;
    }
    if abort.is_aborted() {
        return;
    }
    let now = clock.now();
    let phase = std::mem::take(&mut coordinator.phase);

    match (kind, phase) {
        (EventKind::CollectionTripWake, CollectionTripPhase::Idle) => {
            let Some(batch) = ready.0.acquire(WAKE) else {
                return;
            };
            coordinator.phase = match pool.acquire(STEP) {
                Some(loco) => dispatch(
                    loco, batch, now, &mut clock, &mut ready, &mut pool, &routes, &mut log,
                    &mut locos,
                ),
                None => CollectionTripPhase::AwaitingLocomotive { batch },
            };
        }
        // Busy: a wake during a trip is served once the trip completes.
        (EventKind::CollectionTripWake, busy) => coordinator.phase = busy,

        (EventKind::CollectionTripStep, CollectionTripPhase::AwaitingLocomotive { batch }) => {
            coordinator.phase = match pool.acquire(STEP) {
                Some(loco) => dispatch(
                    loco, batch, now, &mut clock, &mut ready, &mut pool, &routes, &mut log,
                    &mut locos,
                ),
                None => CollectionTripPhase::AwaitingLocomotive { batch },
            };
        }

        (EventKind::CollectionTripStep, CollectionTripPhase::ToCollection { loco, batch }) => {
            // Arrived at the collection track: choose and reserve the retrofit
            // staging destination before coupling starts.
            let total_len = batch_length_m(&batch, &wagons);
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = batch.track_id.clone();

            let strategy = selector.strategies.track_selection;
            let chosen = selector.select(
                TrackKind::Retrofit,
                total_len,
                strategy,
                SelectionScope::RetrofitStaging,
            );
            let destination = match chosen {
                Some(track) => track,
                None => {
                    log.record_selection_failure(
                        now,
                        &loco_state.locomotive_id,
                        format!(
                            "NO_RETROFIT_TRACK_FITS: {total_len}m from {}",
                            batch.track_id
                        ),
                    );
                    coordinator.phase = abandon_trip(
                        loco,
                        &mut loco_state,
                        batch,
                        now,
                        &mut clock,
                        &mut ready,
                        &mut pool,
                        &routes,
                        &mut log,
                    );
                    return;
                }
            };
            let Some(travel_ms) = routes.duration_ms(&batch.track_id, &destination) else {
                log.record_route_error(
                    now,
                    &loco_state.locomotive_id,
                    format!("no route {} -> {destination}", batch.track_id),
                );
                coordinator.phase = abandon_trip(
                    loco,
                    &mut loco_state,
                    batch,
                    now,
                    &mut clock,
                    &mut ready,
                    &mut pool,
                    &routes,
                    &mut log,
                );
                return;
            };
            if !check_or_abort(selector.tracks.add(&destination, total_len), &mut abort) {
                return;
            }
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Coupling, &mut log);
            let couple_ms = times.screw_coupling_ms * batch.wagons.len() as u64;
            clock.schedule_in(couple_ms, EventKind::CollectionTripStep, None);
            coordinator.phase = CollectionTripPhase::Coupling {
                loco,
                batch,
                retrofit_track: destination,
                travel_ms,
            };
        }

        (
            EventKind::CollectionTripStep,
            CollectionTripPhase::Coupling {
                loco,
                batch,
                retrofit_track,
                travel_ms,
            },
        ) => {
            // Coupled: leave the collection track.
            let total_len = batch_length_m(&batch, &wagons);
            for &entity in &batch.wagons {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                if !transition_or_abort(&mut wagon, now, WagonStatus::Moving, &mut abort) {
                    return;
                }
                wagon.source_track_id = wagon.track_id.take();
                wagon.destination_track_id = Some(retrofit_track.clone());
            }
            if !check_or_abort(selector.tracks.remove(&batch.track_id, total_len), &mut abort) {
                return;
            }
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Moving, &mut log);
            clock.schedule_in(travel_ms, EventKind::CollectionTripStep, None);
            coordinator.phase = CollectionTripPhase::ToRetrofit {
                loco,
                batch,
                retrofit_track,
            };
        }

        (
            EventKind::CollectionTripStep,
            CollectionTripPhase::ToRetrofit {
                loco,
                batch,
                retrofit_track,
            },
        ) => {
            // Arrived on the retrofit staging track.
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = retrofit_track.clone();
            for &entity in &batch.wagons {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                wagon.track_id = Some(retrofit_track.clone());
                let from = wagon.source_track_id.clone().unwrap_or_default();
                log.record_move(now, &wagon.wagon_id.clone(), &from, &retrofit_track);
            }
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Decoupling, &mut log);
            let decouple_ms = times.screw_decoupling_ms * batch.wagons.len() as u64;
            clock.schedule_in(decouple_ms, EventKind::CollectionTripStep, None);
            coordinator.phase = CollectionTripPhase::Decoupling {
                loco,
                batch,
                retrofit_track,
            };
        }

        (
            EventKind::CollectionTripStep,
            CollectionTripPhase::Decoupling { loco, batch, .. },
        ) => {
            for &entity in &batch.wagons {
                let Ok(mut wagon) = wagons.get_mut(entity) else {
                    continue;
                };
                if !transition_or_abort(&mut wagon, now, WagonStatus::OnRetrofitTrack, &mut abort)
                {
                    return;
                }
                retrofit_queue.0.push_back(entity);
            }
            clock.schedule_in(0, EventKind::StationAssign, None);

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

        (EventKind::CollectionTripStep, CollectionTripPhase::ReturningHome { loco }) => {
            let Ok(mut loco_state) = locos.get_mut(loco) else {
                return;
            };
            loco_state.track_id = loco_state.home_track_id.clone();
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Parking, &mut log);
            pool.release(loco, &mut clock);
            clock.schedule_in(0, EventKind::CollectionTripWake, None);
            coordinator.phase = CollectionTripPhase::Idle;
        }

        // Stale step with nothing in flight.
        (EventKind::CollectionTripStep, CollectionTripPhase::Idle) => {}
        _ => {}
    }
}

/// Start a trip for `batch` with `loco`, or hand both back when no route
/// reaches the collection track.
#[allow(clippy::too_many_arguments)]
fn dispatch(
    loco: Entity,
    batch: CollectionBatch,
    now: u64,
    clock: &mut SimulationClock,
    ready: &mut CollectionReady,
    pool: &mut LocomotivePool,
    routes: &RouteTable,
    log: &mut EventLog,
    locos: &mut Query<&mut Locomotive>,
) -> CollectionTripPhase {
    let Ok(mut loco_state) = locos.get_mut(loco) else {
        return CollectionTripPhase::Idle;
    };
    match routes.duration_ms(&loco_state.track_id, &batch.track_id) {
        Some(travel_ms) => {
            set_locomotive_status(&mut loco_state, now, LocomotiveStatus::Moving, log);
            clock.schedule_in(travel_ms, EventKind::CollectionTripStep, None);
            CollectionTripPhase::ToCollection { loco, batch }
        }
        None => {
            log.record_route_error(
                now,
                &loco_state.locomotive_id,
                format!("no route {} -> {}", loco_state.track_id, batch.track_id),
            );
            ready.0.requeue(batch);
            ready.0.park(WAKE);
            pool.release(loco, clock);
            CollectionTripPhase::Idle
        }
    }
}

/// Abandon the current trip: hand the batch back for a later retry and send
/// the locomotive home (releasing it in place when no home route exists).
#[allow(clippy::too_many_arguments)]
fn abandon_trip(
    loco: Entity,
    loco_state: &mut Locomotive,
    batch: CollectionBatch,
    now: u64,
    clock: &mut SimulationClock,
    ready: &mut CollectionReady,
    pool: &mut LocomotivePool,
    routes: &RouteTable,
    log: &mut EventLog,
) -> CollectionTripPhase {
    ready.0.requeue(batch);
    ready.0.park(WAKE);
    head_home(loco, loco_state, now, clock, pool, routes, log)
}

/// Send the locomotive to its home track and release it, either after the
/// travel delay or immediately in place when no home route exists.
fn head_home(
    loco: Entity,
    loco_state: &mut Locomotive,
    now: u64,
    clock: &mut SimulationClock,
    pool: &mut LocomotivePool,
    routes: &RouteTable,
    log: &mut EventLog,
) -> CollectionTripPhase {
    match routes.duration_ms(&loco_state.track_id, &loco_state.home_track_id) {
        Some(travel_ms) => {
            set_locomotive_status(loco_state, now, LocomotiveStatus::Moving, log);
            clock.schedule_in(travel_ms, EventKind::CollectionTripStep, None);
            CollectionTripPhase::ReturningHome { loco }
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
            clock.schedule_in(0, EventKind::CollectionTripWake, None);
            CollectionTripPhase::Idle
        }
    }
}
