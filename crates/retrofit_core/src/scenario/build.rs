//! World construction: turn a validated [`Scenario`] into ECS resources and
//! entities, ready for the runner.

use bevy_ecs::prelude::World;

use crate::clock::{minutes_to_ms, SimulationClock};
use crate::ecs::Locomotive;
use crate::pool::LocomotivePool;
use crate::routes::{Route, RouteTable};
use crate::scenario::{BatchConfig, Scenario, SimulationEndTimeMs, StrategyConfig};
use crate::selection::{EligibilityPolicy, RoundRobinState, SelectionRng};
use crate::systems::arrival::{ArrivalCoordinator, TrainPlan};
use crate::systems::collection_trip::{CollectionReady, CollectionTripCoordinator};
use crate::systems::parking_trip::{ParkingReady, ParkingTripCoordinator};
use crate::systems::retrofitted_trip::{RetrofittedReady, RetrofittedTripCoordinator};
use crate::systems::workshop::RetrofitQueue;
use crate::telemetry::{AbortState, EventLog, SnapshotConfig, SnapshotState};
use crate::tracks::TrackCapacityManager;
use crate::workshops::WorkshopCapacityManager;

/// Build the simulation world from a validated scenario. Simulation time 0
/// corresponds to `scenario.start_time`; train arrivals are scheduled by
/// `simulation_started_system` from the plans installed here.
pub fn build_scenario(world: &mut World, scenario: &Scenario) {
    let mut clock = SimulationClock::default();

    world.insert_resource(EventLog::default());
    world.insert_resource(AbortState::default());
    world.insert_resource(SnapshotConfig {
        interval_ms: scenario.snapshot_interval_minutes.map(minutes_to_ms),
    });
    world.insert_resource(SnapshotState::default());

    let mut tracks = TrackCapacityManager::default();
    for track in &scenario.tracks {
        tracks.insert(track.track_id.clone(), track.kind, track.length_m);
    }
    world.insert_resource(tracks);

    let mut workshops = WorkshopCapacityManager::default();
    for workshop in &scenario.workshops {
        workshops.insert(
            workshop.workshop_id.clone(),
            workshop.track_id.clone(),
            workshop.retrofit_stations,
        );
    }
    world.insert_resource(workshops);

    let mut routes = RouteTable::default();
    for route in &scenario.routes {
        routes.insert(Route {
            route_id: route.route_id.clone(),
            source_track_id: route.source_track_id.clone(),
            destination_track_id: route.destination_track_id.clone(),
            duration_ms: minutes_to_ms(route.duration_minutes),
            path: route.path.clone(),
        });
    }
    world.insert_resource(routes);

    world.insert_resource(SelectionRng::from_seed(scenario.random_seed));
    world.insert_resource(RoundRobinState::default());
    world.insert_resource(StrategyConfig {
        track_selection: scenario.track_selection_strategy,
        workshop_selection: scenario.workshop_selection_strategy,
        parking_selection: scenario.parking_selection_strategy,
    });
    world.insert_resource(EligibilityPolicy {
        retrofit_loaded_wagons: scenario.retrofit_loaded_wagons,
        park_non_retrofit_wagons: scenario.park_non_retrofit_wagons,
    });
    world.insert_resource(BatchConfig {
        collection: scenario.collection_batch_size,
        retrofitted: scenario.retrofitted_batch_size,
        parking: scenario.parking_batch_size,
    });
    world.insert_resource(scenario.process_times.to_ms());
    world.insert_resource(SimulationEndTimeMs(minutes_to_ms(scenario.sim_minutes())));

    let mut pool = LocomotivePool::default();
    for locomotive in &scenario.locomotives {
        let entity = world
            .spawn(Locomotive::new(
                locomotive.locomotive_id.clone(),
                locomotive.home_track_id.clone(),
            ))
            .id();
        pool.add(entity, &mut clock);
    }
    world.insert_resource(pool);

    let mut arrivals = ArrivalCoordinator::default();
    for train in &scenario.trains {
        let offset_ms = minutes_to_ms(train.arrival_time - scenario.start_time);
        arrivals.trains.push(TrainPlan::new(
            train.train_id.clone(),
            offset_ms,
            train.wagons.clone(),
        ));
    }
    world.insert_resource(arrivals);

    world.insert_resource(CollectionReady::default());
    world.insert_resource(RetrofittedReady::default());
    world.insert_resource(ParkingReady::default());
    world.insert_resource(RetrofitQueue::default());
    world.insert_resource(CollectionTripCoordinator::default());
    world.insert_resource(RetrofittedTripCoordinator::default());
    world.insert_resource(ParkingTripCoordinator::default());

    world.insert_resource(clock);
}
