//! Simulation runner: advances the clock and routes events into the ECS.
//!
//! Each step pops the next event from [`SimulationClock`], inserts it as
//! [`CurrentEvent`], then runs the schedule. Systems are dispatched by
//! event-kind conditions and chained into a fixed order so that a run over the
//! same scenario and seed produces a bit-identical event log. The runner stops
//! at the horizon or as soon as an invariant violation sets [`AbortState`].

use bevy_ecs::prelude::{Res, Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

use crate::clock::{ms_to_minutes, CurrentEvent, EventKind, SimulationClock};
use crate::ecs::Wagon;
use crate::metrics::{compute_kpis, RunKpis};
use crate::scenario::build::build_scenario;
use crate::scenario::{Scenario, ScenarioError, SimulationEndTimeMs};
use crate::systems::arrival::{hump_wagon_system, simulation_started_system, train_arrived_system};
use crate::systems::collection_trip::collection_trip_system;
use crate::systems::parking_trip::parking_trip_system;
use crate::systems::retrofitted_trip::retrofitted_trip_system;
use crate::systems::snapshot::{capture_snapshot_system, should_capture_snapshot};
use crate::systems::workshop::{
    retrofit_finished_system, station_assign_system, wagon_at_station_system,
};
use crate::telemetry::{AbortState, EventLog, EventRecord};

fn is_simulation_started(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| e.0.kind == EventKind::SimulationStarted)
}

fn is_train_arrived(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| e.0.kind == EventKind::TrainArrived)
}

fn is_hump_wagon(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| e.0.kind == EventKind::HumpWagon)
}

fn is_collection_trip(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| {
        matches!(
            e.0.kind,
            EventKind::CollectionTripWake | EventKind::CollectionTripStep
        )
    })
}

fn is_station_assign(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| e.0.kind == EventKind::StationAssign)
}

fn is_wagon_at_station(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| e.0.kind == EventKind::WagonAtStation)
}

fn is_retrofit_finished(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| e.0.kind == EventKind::RetrofitFinished)
}

fn is_retrofitted_trip(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| {
        matches!(
            e.0.kind,
            EventKind::RetrofittedTripWake | EventKind::RetrofittedTripStep
        )
    })
}

fn is_parking_trip(event: Option<Res<CurrentEvent>>) -> bool {
    event.is_some_and(|e| {
        matches!(
            e.0.kind,
            EventKind::ParkingTripWake | EventKind::ParkingTripStep
        )
    })
}

/// Builds the simulation schedule: all event-reacting systems in a fixed
/// chain, [`apply_deferred`] so wagons spawned on train arrival are visible to
/// the next event, then the optional snapshot capture.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            simulation_started_system.run_if(is_simulation_started),
            train_arrived_system.run_if(is_train_arrived),
            hump_wagon_system.run_if(is_hump_wagon),
            collection_trip_system.run_if(is_collection_trip),
            station_assign_system.run_if(is_station_assign),
            wagon_at_station_system.run_if(is_wagon_at_station),
            retrofit_finished_system.run_if(is_retrofit_finished),
            retrofitted_trip_system.run_if(is_retrofitted_trip),
            parking_trip_system.run_if(is_parking_trip),
            apply_deferred,
            capture_snapshot_system.run_if(should_capture_snapshot),
        )
            .chain(),
    );
    schedule
}

/// Schedules the `SimulationStarted` event at time 0. Call after building the
/// scenario and before running events.
pub fn initialize_simulation(world: &mut World) {
    let mut clock = world.resource_mut::<SimulationClock>();
    clock.schedule_at(0, EventKind::SimulationStarted, None);
}

/// Runs one simulation step. Returns `false` when the clock is empty, the run
/// aborted, or the next event lies at or past the horizon.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    if world
        .get_resource::<AbortState>()
        .is_some_and(|a| a.is_aborted())
    {
        return false;
    }
    let stop_at = world.get_resource::<SimulationEndTimeMs>().map(|e| e.0);
    let next_ts = world
        .get_resource::<SimulationClock>()
        .and_then(|c| c.next_event_time());
    if let (Some(end_ms), Some(ts)) = (stop_at, next_ts) {
        if ts >= end_ms {
            return false;
        }
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Runs steps until the queue drains (or the horizon/abort stops the run) or
/// `max_steps` is reached. Returns the number of steps executed.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}

/// A wagon's last known state when the run ended.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WagonFinalState {
    pub wagon_id: String,
    pub train_id: String,
    pub status: String,
    pub track_id: Option<String>,
}

/// End-of-run state: abort cause (if any) and every wagon's final status.
/// Wagons with a non-terminal status were in flight when the horizon struck.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FinalState {
    pub aborted: Option<String>,
    pub sim_minutes: f64,
    pub wagons: Vec<WagonFinalState>,
}

/// Everything a run produces: the event log, aggregated KPIs, and the final
/// state of the world.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunResult {
    pub events: Vec<EventRecord>,
    pub kpis: RunKpis,
    pub final_state: FinalState,
}

/// Upper bound on events per run; a backstop against scenarios that cycle
/// without advancing time (e.g. zero-duration retry loops).
const MAX_RUN_STEPS: usize = 10_000_000;

/// Validate, build, run to the horizon and aggregate. The entry point wrapped
/// by the CLI.
pub fn run(scenario: &Scenario) -> Result<RunResult, ScenarioError> {
    scenario.validate()?;

    let mut world = World::new();
    build_scenario(&mut world, scenario);
    initialize_simulation(&mut world);
    let mut schedule = simulation_schedule();
    run_until_empty(&mut world, &mut schedule, MAX_RUN_STEPS);

    let horizon_ms = world.resource::<SimulationEndTimeMs>().0;
    let kpis = compute_kpis(&mut world, horizon_ms);
    let aborted = world.resource::<AbortState>().cause.clone();

    let mut wagons: Vec<WagonFinalState> = world
        .query::<&Wagon>()
        .iter(&world)
        .map(|w| WagonFinalState {
            wagon_id: w.wagon_id.clone(),
            train_id: w.train_id.clone(),
            status: w.status.as_str().to_string(),
            track_id: w.track_id.clone(),
        })
        .collect();
    wagons.sort_by(|a, b| a.wagon_id.cmp(&b.wagon_id));

    let events = std::mem::take(&mut world.resource_mut::<EventLog>().records);
    Ok(RunResult {
        events,
        kpis,
        final_state: FinalState {
            aborted,
            sim_minutes: ms_to_minutes(horizon_ms),
            wagons,
        },
    })
}
