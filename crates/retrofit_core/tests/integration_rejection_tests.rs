mod support;

use retrofit_core::runner::run;
use retrofit_core::telemetry::SimEventKind;
use support::scenario::{pipeline_scenario, set_track_length, train, wagon};

#[test]
fn loaded_wagon_is_rejected_without_touching_a_locomotive() {
    let scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![wagon("t1-w1", 20.0, true, true)],
    )]);
    let result = run(&scenario).expect("valid scenario");

    assert_eq!(result.kpis.aggregate.wagons_rejected, 1);
    assert_eq!(result.kpis.aggregate.wagons_parked, 0);

    let rejected = result
        .events
        .iter()
        .find(|e| e.kind == SimEventKind::WagonRejected)
        .expect("rejection event");
    assert_eq!(rejected.timestamp, 0);
    assert_eq!(rejected.details["reason"], "INELIGIBLE_LOADED");

    // The locomotive never moved: its only recorded status is the initial
    // parking entry.
    assert!(result
        .events
        .iter()
        .all(|e| e.kind != SimEventKind::LocomotiveStatusChanged));
    let loco = &result.kpis.locomotives[0];
    assert_eq!(loco.parking_minutes, result.kpis.aggregate.sim_minutes);
}

#[test]
fn loaded_wagon_passes_with_the_policy_flag() {
    let mut scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![wagon("t1-w1", 20.0, true, true)],
    )]);
    scenario.retrofit_loaded_wagons = true;
    let result = run(&scenario).expect("valid scenario");

    assert_eq!(result.kpis.aggregate.wagons_rejected, 0);
    assert_eq!(result.kpis.aggregate.wagons_parked, 1);
}

#[test]
fn non_retrofit_wagon_is_rejected_by_default() {
    let scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![wagon("t1-w1", 20.0, false, false)],
    )]);
    let result = run(&scenario).expect("valid scenario");

    let rejected = result
        .events
        .iter()
        .find(|e| e.kind == SimEventKind::WagonRejected)
        .expect("rejection event");
    assert_eq!(rejected.details["reason"], "INELIGIBLE_NOT_FLAGGED");
}

#[test]
fn wagon_longer_than_every_collection_track_is_rejected() {
    let mut scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![wagon("t1-w1", 20.0, false, true)],
    )]);
    set_track_length(&mut scenario, "col-1", 15.0);
    let result = run(&scenario).expect("valid scenario");

    assert_eq!(result.kpis.aggregate.wagons_rejected, 1);
    let rejected = result
        .events
        .iter()
        .find(|e| e.kind == SimEventKind::WagonRejected)
        .expect("rejection event");
    assert_eq!(rejected.details["reason"], "NO_COLLECTION_TRACK_FITS");

    let kpi = &result.kpis.wagons[0];
    assert_eq!(kpi.rejection_reason.as_deref(), Some("NO_COLLECTION_TRACK_FITS"));
}

#[test]
fn fully_ineligible_train_rejects_every_wagon() {
    let scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![
            wagon("t1-w1", 20.0, true, true),
            wagon("t1-w2", 20.0, false, false),
            wagon("t1-w3", 20.0, true, false),
        ],
    )]);
    let result = run(&scenario).expect("valid scenario");

    assert_eq!(result.kpis.aggregate.wagons_arrived, 3);
    assert_eq!(result.kpis.aggregate.wagons_rejected, 3);
    assert_eq!(result.kpis.aggregate.wagons_in_flight, 0);
    assert_eq!(result.events.iter().filter(|e| e.kind == SimEventKind::WagonSelected).count(), 0);
    // No pickup was ever formed, so collection stays empty.
    let collection = result
        .kpis
        .tracks
        .iter()
        .find(|t| t.track_id == "col-1")
        .expect("collection track");
    assert_eq!(collection.current_occupancy_m, 0.0);
    assert_eq!(collection.peak_occupancy_m, 0.0);
}

/// When no parking track can take the wagon it stalls on retrofitted staging:
/// reported in flight as RETROFITTED, with the failure surfaced in the log.
#[test]
fn zero_parking_capacity_stalls_wagons_at_retrofitted() {
    let mut scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![wagon("t1-w1", 20.0, false, true)],
    )]);
    set_track_length(&mut scenario, "park-1", 5.0);
    scenario.end_time = 60.0;
    let result = run(&scenario).expect("valid scenario");

    assert!(result.final_state.aborted.is_none());
    assert_eq!(result.kpis.aggregate.wagons_parked, 0);
    assert_eq!(result.kpis.aggregate.wagons_in_flight, 1);

    let stuck = &result.final_state.wagons[0];
    assert_eq!(stuck.status, "RETROFITTED");
    assert_eq!(stuck.track_id.as_deref(), Some("fin-1"));

    let failure = result
        .events
        .iter()
        .find(|e| e.kind == SimEventKind::TrackSelectionFailed)
        .expect("selection failure surfaced");
    assert_eq!(failure.details["severity"], "ERROR");
    assert!(failure.details["detail"].contains("NO_PARKING_TRACK_FITS"));
}

/// A missing route aborts the trip but not the run: the error is logged, the
/// locomotive is back in the pool, and the batch stays put.
#[test]
fn missing_route_is_reported_and_recovered() {
    let mut scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![wagon("t1-w1", 20.0, false, true)],
    )]);
    // Sever the depot -> collection approach.
    scenario
        .routes
        .retain(|r| !(r.source_track_id == "depot" && r.destination_track_id == "col-1"));
    scenario.end_time = 30.0;
    let result = run(&scenario).expect("valid scenario");

    assert!(result.final_state.aborted.is_none());
    let error = result
        .events
        .iter()
        .find(|e| e.kind == SimEventKind::RouteError)
        .expect("route error surfaced");
    assert_eq!(error.details["severity"], "ERROR");

    // The wagon never left collection.
    let stuck = &result.final_state.wagons[0];
    assert_eq!(stuck.status, "SELECTED");
    assert_eq!(stuck.track_id.as_deref(), Some("col-1"));
}
