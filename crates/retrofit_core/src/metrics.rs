//! End-of-run KPI aggregation.
//!
//! Computed once when the run ends, from the capacity managers, locomotive
//! status histories and wagon components. All durations are reported in
//! fractional minutes; utilizations in percent.

use bevy_ecs::prelude::World;

use crate::clock::ms_to_minutes;
use crate::ecs::{Locomotive, LocomotiveStatus, Wagon, WagonStatus};
use crate::tracks::TrackCapacityManager;
use crate::workshops::WorkshopCapacityManager;

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkshopKpi {
    pub workshop_id: String,
    pub completed_retrofits: u64,
    pub total_retrofit_minutes: f64,
    pub total_waiting_minutes: f64,
    pub throughput_per_hour: f64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LocomotiveKpi {
    pub locomotive_id: String,
    pub parking_minutes: f64,
    pub moving_minutes: f64,
    pub coupling_minutes: f64,
    pub decoupling_minutes: f64,
    pub parking_percent: f64,
    pub moving_percent: f64,
    pub coupling_percent: f64,
    pub decoupling_percent: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackKpi {
    pub track_id: String,
    pub kind: String,
    pub max_capacity_m: f64,
    pub current_occupancy_m: f64,
    pub peak_occupancy_m: f64,
    pub utilization_percent: f64,
    pub state: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WagonKpi {
    pub wagon_id: String,
    pub train_id: String,
    pub status: String,
    pub total_minutes: f64,
    pub waiting_minutes: f64,
    pub retrofit_minutes: f64,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregateKpis {
    pub wagons_arrived: usize,
    pub wagons_parked: usize,
    pub wagons_rejected: usize,
    pub wagons_in_flight: usize,
    pub completed_retrofits: u64,
    pub sim_minutes: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunKpis {
    pub aggregate: AggregateKpis,
    pub workshops: Vec<WorkshopKpi>,
    pub locomotives: Vec<LocomotiveKpi>,
    pub tracks: Vec<TrackKpi>,
    pub wagons: Vec<WagonKpi>,
}

fn track_state_label(occupied_m: f64, length_m: f64) -> &'static str {
    if occupied_m <= f64::EPSILON {
        "EMPTY"
    } else if occupied_m >= length_m - f64::EPSILON {
        "FULL"
    } else {
        "AVAILABLE"
    }
}

/// Minutes a locomotive spent in each status, its history clipped to the
/// horizon.
fn locomotive_status_minutes(locomotive: &Locomotive, horizon_ms: u64) -> [f64; 4] {
    let mut totals_ms = [0u64; 4];
    let history = &locomotive.status_history;
    for (i, &(start, status)) in history.iter().enumerate() {
        let end = history
            .get(i + 1)
            .map(|&(t, _)| t)
            .unwrap_or(horizon_ms)
            .min(horizon_ms);
        let slot = match status {
            LocomotiveStatus::Parking => 0,
            LocomotiveStatus::Moving => 1,
            LocomotiveStatus::Coupling => 2,
            LocomotiveStatus::Decoupling => 3,
        };
        totals_ms[slot] += end.saturating_sub(start.min(horizon_ms));
    }
    totals_ms.map(ms_to_minutes)
}

pub fn compute_kpis(world: &mut World, horizon_ms: u64) -> RunKpis {
    let sim_minutes = ms_to_minutes(horizon_ms);

    let mut workshops: Vec<WorkshopKpi> = world
        .resource::<WorkshopCapacityManager>()
        .workshops()
        .iter()
        .map(|w| {
            let busy_ms = w.busy_station_ms_at(horizon_ms);
            let capacity_ms = w.retrofit_stations as u64 * horizon_ms;
            WorkshopKpi {
                workshop_id: w.workshop_id.clone(),
                completed_retrofits: w.completed_retrofits,
                total_retrofit_minutes: ms_to_minutes(w.total_retrofit_ms),
                total_waiting_minutes: ms_to_minutes(w.total_waiting_ms),
                throughput_per_hour: w.completed_retrofits as f64 * 60.0 / sim_minutes,
                utilization_percent: if capacity_ms == 0 {
                    0.0
                } else {
                    busy_ms as f64 / capacity_ms as f64 * 100.0
                },
            }
        })
        .collect();
    workshops.sort_by(|a, b| a.workshop_id.cmp(&b.workshop_id));

    let mut locomotives: Vec<LocomotiveKpi> = world
        .query::<&Locomotive>()
        .iter(world)
        .map(|l| {
            let [parking, moving, coupling, decoupling] =
                locomotive_status_minutes(l, horizon_ms);
            let pct = |m: f64| m / sim_minutes * 100.0;
            LocomotiveKpi {
                locomotive_id: l.locomotive_id.clone(),
                parking_minutes: parking,
                moving_minutes: moving,
                coupling_minutes: coupling,
                decoupling_minutes: decoupling,
                parking_percent: pct(parking),
                moving_percent: pct(moving),
                coupling_percent: pct(coupling),
                decoupling_percent: pct(decoupling),
            }
        })
        .collect();
    locomotives.sort_by(|a, b| a.locomotive_id.cmp(&b.locomotive_id));

    let tracks: Vec<TrackKpi> = world
        .resource::<TrackCapacityManager>()
        .tracks()
        .iter()
        .map(|t| TrackKpi {
            track_id: t.track_id.clone(),
            kind: t.kind.as_str().to_string(),
            max_capacity_m: t.length_m,
            current_occupancy_m: t.occupied_m,
            peak_occupancy_m: t.peak_occupied_m,
            utilization_percent: t.occupancy_ratio() * 100.0,
            state: track_state_label(t.occupied_m, t.length_m).to_string(),
        })
        .collect();

    let mut wagons: Vec<WagonKpi> = world
        .query::<&Wagon>()
        .iter(world)
        .map(|w| {
            let end = w.finished_time.unwrap_or(horizon_ms);
            let waiting_end = w.retrofit_start_time.unwrap_or(match w.status {
                WagonStatus::OnRetrofitTrack => horizon_ms,
                _ => w.retrofit_track_arrival_time.unwrap_or(horizon_ms),
            });
            let waiting_ms = w
                .retrofit_track_arrival_time
                .map(|arrived| waiting_end.saturating_sub(arrived))
                .unwrap_or(0);
            let retrofit_ms = match (w.retrofit_start_time, w.retrofit_end_time) {
                (Some(start), Some(finish)) => finish.saturating_sub(start),
                _ => 0,
            };
            WagonKpi {
                wagon_id: w.wagon_id.clone(),
                train_id: w.train_id.clone(),
                status: w.status.as_str().to_string(),
                total_minutes: ms_to_minutes(end.saturating_sub(w.arrival_time)),
                waiting_minutes: ms_to_minutes(waiting_ms),
                retrofit_minutes: ms_to_minutes(retrofit_ms),
                rejection_reason: w.rejection_reason.map(|r| r.as_str().to_string()),
            }
        })
        .collect();
    wagons.sort_by(|a, b| a.wagon_id.cmp(&b.wagon_id));

    let wagons_arrived = wagons.len();
    let wagons_parked = wagons.iter().filter(|w| w.status == "PARKED").count();
    let wagons_rejected = wagons.iter().filter(|w| w.status == "REJECTED").count();
    let completed_retrofits = workshops.iter().map(|w| w.completed_retrofits).sum();

    RunKpis {
        aggregate: AggregateKpis {
            wagons_arrived,
            wagons_parked,
            wagons_rejected,
            wagons_in_flight: wagons_arrived - wagons_parked - wagons_rejected,
            completed_retrofits,
            sim_minutes,
        },
        workshops,
        locomotives,
        tracks,
        wagons,
    }
}
