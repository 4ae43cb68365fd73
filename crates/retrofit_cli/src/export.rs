//! CSV export: writes the six result tables of a simulation run.
//!
//! Field names and units are stable: durations and timestamps in minutes,
//! lengths in meters.

use std::fs::File;
use std::path::Path;

use retrofit_core::clock::ms_to_minutes;
use retrofit_core::runner::RunResult;
use retrofit_core::telemetry::{EventRecord, SimEventKind};

type ExportResult = Result<(), Box<dyn std::error::Error>>;

fn details_column(record: &EventRecord) -> String {
    record
        .details
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// `events.csv`: the full ordered event log.
pub fn write_events_csv(result: &RunResult, file: File) -> ExportResult {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(["timestamp", "event_type", "entity_id", "details"])?;
    for record in &result.events {
        wtr.write_record([
            &ms_to_minutes(record.timestamp).to_string(),
            record.kind.as_str(),
            &record.entity_id,
            &details_column(record),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

const JOURNEY_KINDS: [SimEventKind; 6] = [
    SimEventKind::WagonSelected,
    SimEventKind::WagonRejected,
    SimEventKind::WagonMoved,
    SimEventKind::RetrofitStarted,
    SimEventKind::RetrofitCompleted,
    SimEventKind::WagonParked,
];

/// `wagon_journey.csv`: the per-wagon timeline, one row per lifecycle event.
pub fn write_wagon_journey_csv(result: &RunResult, file: File) -> ExportResult {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(["wagon_id", "timestamp", "event_type", "details"])?;
    for record in &result.events {
        if !JOURNEY_KINDS.contains(&record.kind) {
            continue;
        }
        wtr.write_record([
            &record.entity_id,
            &ms_to_minutes(record.timestamp).to_string(),
            record.kind.as_str(),
            &details_column(record),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// `workshop_metrics.csv`: completions, throughput and utilization.
pub fn write_workshop_metrics_csv(result: &RunResult, file: File) -> ExportResult {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record([
        "workshop_id",
        "completed_retrofits",
        "total_retrofit_time",
        "total_waiting_time",
        "throughput_per_hour",
        "utilization_percent",
    ])?;
    for workshop in &result.kpis.workshops {
        wtr.write_record([
            &workshop.workshop_id,
            &workshop.completed_retrofits.to_string(),
            &workshop.total_retrofit_minutes.to_string(),
            &workshop.total_waiting_minutes.to_string(),
            &workshop.throughput_per_hour.to_string(),
            &workshop.utilization_percent.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// `locomotive_utilization.csv`: minutes and share per status.
pub fn write_locomotive_utilization_csv(result: &RunResult, file: File) -> ExportResult {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record([
        "locomotive_id",
        "parking_minutes",
        "moving_minutes",
        "coupling_minutes",
        "decoupling_minutes",
        "parking_percent",
        "moving_percent",
        "coupling_percent",
        "decoupling_percent",
    ])?;
    for loco in &result.kpis.locomotives {
        wtr.write_record([
            &loco.locomotive_id,
            &loco.parking_minutes.to_string(),
            &loco.moving_minutes.to_string(),
            &loco.coupling_minutes.to_string(),
            &loco.decoupling_minutes.to_string(),
            &loco.parking_percent.to_string(),
            &loco.moving_percent.to_string(),
            &loco.coupling_percent.to_string(),
            &loco.decoupling_percent.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// `track_capacity.csv`: final occupancy per track.
pub fn write_track_capacity_csv(result: &RunResult, file: File) -> ExportResult {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record([
        "track_id",
        "max_capacity_m",
        "current_occupancy_m",
        "utilization_percent",
        "state",
    ])?;
    for track in &result.kpis.tracks {
        wtr.write_record([
            &track.track_id,
            &track.max_capacity_m.to_string(),
            &track.current_occupancy_m.to_string(),
            &track.utilization_percent.to_string(),
            &track.state,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// `rejected_wagons.csv`: itemized rejections with reason and time.
pub fn write_rejected_wagons_csv(result: &RunResult, file: File) -> ExportResult {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(["wagon_id", "train_id", "rejection_time", "reason"])?;
    for record in &result.events {
        if record.kind != SimEventKind::WagonRejected {
            continue;
        }
        wtr.write_record([
            &record.entity_id,
            record.details.get("train").map(String::as_str).unwrap_or(""),
            &ms_to_minutes(record.timestamp).to_string(),
            record.details.get("reason").map(String::as_str).unwrap_or(""),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write all six tables into `dir`, creating it if needed.
pub fn export_run(result: &RunResult, dir: &Path) -> ExportResult {
    std::fs::create_dir_all(dir)?;
    let create = |name: &str| File::create(dir.join(name));
    write_events_csv(result, create("events.csv")?)?;
    write_wagon_journey_csv(result, create("wagon_journey.csv")?)?;
    write_workshop_metrics_csv(result, create("workshop_metrics.csv")?)?;
    write_locomotive_utilization_csv(result, create("locomotive_utilization.csv")?)?;
    write_track_capacity_csv(result, create("track_capacity.csv")?)?;
    write_rejected_wagons_csv(result, create("rejected_wagons.csv")?)?;
    Ok(())
}
