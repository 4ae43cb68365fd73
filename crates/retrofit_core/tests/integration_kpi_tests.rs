mod support;

use retrofit_core::runner::run;
use retrofit_core::selection::TrackSelectionStrategy;
use support::scenario::{all_pairs_routes, pipeline_scenario, train, wagon};

fn two_wagon_scenario() -> retrofit_core::scenario::Scenario {
    pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![
            wagon("t1-w1", 20.0, false, true),
            wagon("t1-w2", 20.0, false, true),
        ],
    )])
}

#[test]
fn throughput_follows_the_completion_count() {
    let result = run(&two_wagon_scenario()).expect("valid scenario");
    let sim_minutes = result.kpis.aggregate.sim_minutes;
    for workshop in &result.kpis.workshops {
        let expected = workshop.completed_retrofits as f64 * 60.0 / sim_minutes;
        assert!((workshop.throughput_per_hour - expected).abs() < 1e-9);
        assert!(workshop.utilization_percent >= 0.0);
        assert!(workshop.utilization_percent <= 100.0);
    }
    assert_eq!(result.kpis.aggregate.completed_retrofits, 2);
}

#[test]
fn locomotive_minutes_sum_to_the_simulation_length() {
    let result = run(&two_wagon_scenario()).expect("valid scenario");
    let sim_minutes = result.kpis.aggregate.sim_minutes;
    for loco in &result.kpis.locomotives {
        let total =
            loco.parking_minutes + loco.moving_minutes + loco.coupling_minutes + loco.decoupling_minutes;
        assert!(
            (total - sim_minutes).abs() < 1e-6,
            "status minutes {total} != sim minutes {sim_minutes}"
        );
        let pct_total = loco.parking_percent
            + loco.moving_percent
            + loco.coupling_percent
            + loco.decoupling_percent;
        assert!((pct_total - 100.0).abs() < 1e-6);
    }
}

#[test]
fn arrived_wagons_are_conserved() {
    // Mix of parked, rejected, and horizon-cut wagons.
    let mut scenario = pipeline_scenario(vec![train(
        "t1",
        0.0,
        vec![
            wagon("t1-w1", 20.0, false, true),
            wagon("t1-w2", 20.0, true, true),
            wagon("t1-w3", 20.0, false, true),
        ],
    )]);
    scenario.end_time = 18.0;
    let result = run(&scenario).expect("valid scenario");

    let agg = &result.kpis.aggregate;
    assert_eq!(
        agg.wagons_arrived,
        agg.wagons_parked + agg.wagons_rejected + agg.wagons_in_flight
    );
    assert_eq!(agg.wagons_arrived, 3);
    assert_eq!(agg.wagons_rejected, 1);
}

#[test]
fn occupancy_never_exceeds_track_length_outside_workshops() {
    let result = run(&two_wagon_scenario()).expect("valid scenario");
    for track in &result.kpis.tracks {
        if track.kind != "WORKSHOP" {
            assert!(
                track.peak_occupancy_m <= track.max_capacity_m + f64::EPSILON,
                "track {} peaked at {} over {}",
                track.track_id,
                track.peak_occupancy_m,
                track.max_capacity_m
            );
        }
        assert!(track.current_occupancy_m >= 0.0);
    }
}

#[test]
fn wagon_kpis_cover_the_retrofit_window() {
    let result = run(&two_wagon_scenario()).expect("valid scenario");
    let w1 = result
        .kpis
        .wagons
        .iter()
        .find(|w| w.wagon_id == "t1-w1")
        .expect("first wagon");
    assert_eq!(w1.retrofit_minutes, 10.0);
    assert_eq!(w1.waiting_minutes, 0.0);
    assert_eq!(w1.total_minutes, 17.0);

    let w2 = result
        .kpis
        .wagons
        .iter()
        .find(|w| w.wagon_id == "t1-w2")
        .expect("second wagon");
    assert_eq!(w2.retrofit_minutes, 10.0);
    // Queued on staging from 2 until its station freed at 12.
    assert_eq!(w2.waiting_minutes, 10.0);
}

/// Least-occupied parking spreads wagons from separate trips over the
/// emptier track; first-available keeps using the declared first.
#[test]
fn parking_strategy_controls_distribution() {
    let base = |strategy| {
        let mut scenario = pipeline_scenario(vec![
            train("t1", 0.0, vec![wagon("t1-w1", 20.0, false, true)]),
            train("t2", 60.0, vec![wagon("t2-w1", 20.0, false, true)]),
        ]);
        let mut park2 = scenario.tracks[5].clone();
        park2.track_id = "park-2".to_string();
        scenario.tracks.push(park2);
        scenario.routes = all_pairs_routes(&scenario.tracks, 1.0);
        scenario.parking_selection_strategy = strategy;
        scenario
    };

    let first = run(&base(TrackSelectionStrategy::FirstAvailable)).expect("valid scenario");
    let occupancy = |result: &retrofit_core::runner::RunResult, id: &str| {
        result
            .kpis
            .tracks
            .iter()
            .find(|t| t.track_id == id)
            .map(|t| t.current_occupancy_m)
            .unwrap_or_default()
    };
    assert_eq!(occupancy(&first, "park-1"), 40.0);
    assert_eq!(occupancy(&first, "park-2"), 0.0);

    let least = run(&base(TrackSelectionStrategy::LeastOccupied)).expect("valid scenario");
    assert_eq!(occupancy(&least, "park-1"), 20.0);
    assert_eq!(occupancy(&least, "park-2"), 20.0);
}
