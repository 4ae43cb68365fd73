//! Train arrival coordinator: spawns wagons and humps them onto collection
//! tracks.
//!
//! Each train gets a `TrainArrived` event at its arrival time; wagons are then
//! humped one by one, spaced by the hump interval. Humping runs the selector:
//! ineligible wagons are rejected, eligible ones get a collection track via
//! the configured strategy. When the last wagon of a train is humped, one
//! collection batch per touched track is handed to the pickup coordinator
//! (batch boundary: train fully humped; an optional batch-size cap flushes
//! earlier).

use bevy_ecs::prelude::{Commands, Entity, Query, Res, ResMut, Resource};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{RejectionReason, Wagon, WagonStatus};
use crate::scenario::{BatchConfig, ProcessTimesMs, WagonConfig};
use crate::selection::{
    evaluate_wagon, EligibilityPolicy, SelectionOutcome, SelectionScope, TrackSelector,
};
use crate::store::Waiter;
use crate::systems::collection_trip::{CollectionBatch, CollectionReady};
use crate::systems::parking_trip::ParkingReady;
use crate::systems::retrofitted_trip::RetrofittedReady;
use crate::systems::{check_or_abort, transition_or_abort};
use crate::telemetry::{AbortState, EventLog, SimEventKind};
use crate::tracks::TrackKind;

/// One scheduled train: its wagon configs, the spawned entities, and the
/// per-track accumulation of humped wagons awaiting batch formation.
#[derive(Debug)]
pub struct TrainPlan {
    pub train_id: String,
    /// Arrival offset from scenario start, ms.
    pub arrival_offset_ms: u64,
    pub wagon_configs: Vec<WagonConfig>,
    pub entities: Vec<Entity>,
    pub next_wagon: usize,
    /// Humped retrofit-bound wagons per collection track, insertion order.
    pending_retrofit: Vec<(String, Vec<Entity>)>,
    /// Humped park-only wagons (policy flag), flushed on train completion.
    pending_parking: Vec<Entity>,
}

impl TrainPlan {
    pub fn new(train_id: String, arrival_offset_ms: u64, wagon_configs: Vec<WagonConfig>) -> Self {
        Self {
            train_id,
            arrival_offset_ms,
            wagon_configs,
            entities: Vec::new(),
            next_wagon: 0,
            pending_retrofit: Vec::new(),
            pending_parking: Vec::new(),
        }
    }

    fn push_pending(&mut self, track_id: &str, wagon: Entity) -> usize {
        if let Some((_, group)) = self
            .pending_retrofit
            .iter_mut()
            .find(|(id, _)| id == track_id)
        {
            group.push(wagon);
            group.len()
        } else {
            self.pending_retrofit
                .push((track_id.to_string(), vec![wagon]));
            1
        }
    }

    fn take_pending(&mut self, track_id: &str) -> Option<(String, Vec<Entity>)> {
        let idx = self.pending_retrofit.iter().position(|(id, _)| id == track_id)?;
        Some(self.pending_retrofit.remove(idx))
    }
}

#[derive(Debug, Default, Resource)]
pub struct ArrivalCoordinator {
    pub trains: Vec<TrainPlan>,
}

/// Reacts to `SimulationStarted`: schedules every train arrival and parks the
/// three pickup coordinators on their ready stores so the first `put` wakes
/// them.
pub fn simulation_started_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    arrivals: Res<ArrivalCoordinator>,
    mut collection_ready: ResMut<CollectionReady>,
    mut retrofitted_ready: ResMut<RetrofittedReady>,
    mut parking_ready: ResMut<ParkingReady>,
) {
    if event.0.kind != EventKind::SimulationStarted {
        return;
    }

    for (idx, plan) in arrivals.trains.iter().enumerate() {
        clock.schedule_at(
            plan.arrival_offset_ms,
            EventKind::TrainArrived,
            Some(EventSubject::Train(idx)),
        );
    }

    collection_ready
        .0
        .park(Waiter::new(EventKind::CollectionTripWake));
    retrofitted_ready
        .0
        .park(Waiter::new(EventKind::RetrofittedTripWake));
    parking_ready.0.park(Waiter::new(EventKind::ParkingTripWake));
}

/// Spawns a train's wagons and starts the hump sequence.
pub fn train_arrived_system(
    mut commands: Commands,
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut arrivals: ResMut<ArrivalCoordinator>,
    times: Res<ProcessTimesMs>,
    mut log: ResMut<EventLog>,
) {
    if event.0.kind != EventKind::TrainArrived {
        return;
    }
    let Some(EventSubject::Train(train_idx)) = event.0.subject else {
        return;
    };
    let now = clock.now();
    let Some(plan) = arrivals.trains.get_mut(train_idx) else {
        return;
    };

    for config in &plan.wagon_configs {
        let entity = commands
            .spawn(Wagon::new(
                config.wagon_id.clone(),
                plan.train_id.clone(),
                config.length_m,
                config.is_loaded,
                config.needs_retrofit,
                now,
            ))
            .id();
        plan.entities.push(entity);
    }

    log.record(
        now,
        SimEventKind::TrainArrived,
        plan.train_id.clone(),
        [("wagons", plan.entities.len().to_string())],
    );

    if !plan.entities.is_empty() {
        clock.schedule_in(
            times.train_to_hump_delay_ms,
            EventKind::HumpWagon,
            Some(EventSubject::Train(train_idx)),
        );
    }
}

/// Humps the train's next wagon: runs the selector, places the wagon on a
/// collection track (or rejects it) and forms batches.
#[allow(clippy::too_many_arguments)]
pub fn hump_wagon_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut arrivals: ResMut<ArrivalCoordinator>,
    mut selector: TrackSelector,
    policy: Res<EligibilityPolicy>,
    batches: Res<BatchConfig>,
    times: Res<ProcessTimesMs>,
    mut collection_ready: ResMut<CollectionReady>,
    mut parking_ready: ResMut<ParkingReady>,
    mut log: ResMut<EventLog>,
    mut abort: ResMut<AbortState>,
    mut wagons: Query<&mut Wagon>,
) {
    if event.0.kind != EventKind::HumpWagon {
        return;
    }
    let Some(EventSubject::Train(train_idx)) = event.0.subject else {
        return;
    };
    let now = clock.now();
    let Some(plan) = arrivals.trains.get_mut(train_idx) else {
        return;
    };
    let Some(&wagon_entity) = plan.entities.get(plan.next_wagon) else {
        return;
    };
    let Ok(mut wagon) = wagons.get_mut(wagon_entity) else {
        return;
    };

    if !transition_or_abort(&mut wagon, now, WagonStatus::Selecting, &mut abort) {
        return;
    }

    match evaluate_wagon(&wagon, &policy) {
        SelectionOutcome::Reject(reason) => {
            wagon.rejection_reason = Some(reason);
            if !transition_or_abort(&mut wagon, now, WagonStatus::Rejected, &mut abort) {
                return;
            }
            log.record(
                now,
                SimEventKind::WagonRejected,
                wagon.wagon_id.clone(),
                [
                    ("reason", reason.as_str().to_string()),
                    ("train", wagon.train_id.clone()),
                ],
            );
        }
        outcome => {
            let strategy = selector.strategies.track_selection;
            let chosen = selector.select(
                TrackKind::Collection,
                wagon.length_m,
                strategy,
                SelectionScope::Collection,
            );
            match chosen {
                None => {
                    wagon.rejection_reason = Some(RejectionReason::NoCollectionTrackFits);
                    if !transition_or_abort(&mut wagon, now, WagonStatus::Rejected, &mut abort) {
                        return;
                    }
                    log.record(
                        now,
                        SimEventKind::WagonRejected,
                        wagon.wagon_id.clone(),
                        [
                            (
                                "reason",
                                RejectionReason::NoCollectionTrackFits.as_str().to_string(),
                            ),
                            ("train", wagon.train_id.clone()),
                        ],
                    );
                }
                Some(track_id) => {
                    if !check_or_abort(selector.tracks.add(&track_id, wagon.length_m), &mut abort)
                    {
                        return;
                    }
                    wagon.track_id = Some(track_id.clone());
                    if !transition_or_abort(&mut wagon, now, WagonStatus::Selected, &mut abort) {
                        return;
                    }
                    log.record(
                        now,
                        SimEventKind::WagonSelected,
                        wagon.wagon_id.clone(),
                        [
                            ("track", track_id.clone()),
                            ("train", wagon.train_id.clone()),
                        ],
                    );
                    match outcome {
                        SelectionOutcome::Retrofit => {
                            let group_len = plan.push_pending(&track_id, wagon_entity);
                            if batches.collection.is_some_and(|cap| group_len >= cap) {
                                if let Some((track, group)) = plan.take_pending(&track_id) {
                                    collection_ready.0.put(
                                        CollectionBatch {
                                            track_id: track,
                                            wagons: group,
                                        },
                                        &mut clock,
                                    );
                                }
                            }
                        }
                        SelectionOutcome::ParkOnly => plan.pending_parking.push(wagon_entity),
                        SelectionOutcome::Reject(_) => unreachable!(),
                    }
                }
            }
        }
    }

    plan.next_wagon += 1;
    if plan.next_wagon < plan.entities.len() {
        clock.schedule_in(
            times.wagon_hump_interval_ms,
            EventKind::HumpWagon,
            Some(EventSubject::Train(train_idx)),
        );
    } else {
        // Train fully humped: flush remaining batches in first-touched order.
        let groups = std::mem::take(&mut plan.pending_retrofit);
        for (track_id, wagons) in groups {
            collection_ready.0.put(
                CollectionBatch {
                    track_id,
                    wagons,
                },
                &mut clock,
            );
        }
        for entity in std::mem::take(&mut plan.pending_parking) {
            parking_ready.0.put(entity, &mut clock);
        }
    }
}
