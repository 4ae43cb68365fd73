//! Event log and abort state: records typed simulation events for analysis.
//!
//! The log is append-only and is the single source of truth for KPI
//! aggregation and export. Details use a `BTreeMap` so serialized records have
//! a stable field order.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimEventKind {
    TrainArrived,
    WagonSelected,
    WagonRejected,
    WagonMoved,
    RetrofitStarted,
    RetrofitCompleted,
    WagonParked,
    LocomotiveStatusChanged,
    RouteError,
    TrackSelectionFailed,
    ResourceSnapshot,
}

impl SimEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SimEventKind::TrainArrived => "TRAIN_ARRIVED",
            SimEventKind::WagonSelected => "WAGON_SELECTED",
            SimEventKind::WagonRejected => "WAGON_REJECTED",
            SimEventKind::WagonMoved => "WAGON_MOVED",
            SimEventKind::RetrofitStarted => "RETROFIT_STARTED",
            SimEventKind::RetrofitCompleted => "RETROFIT_COMPLETED",
            SimEventKind::WagonParked => "WAGON_PARKED",
            SimEventKind::LocomotiveStatusChanged => "LOCOMOTIVE_STATUS_CHANGED",
            SimEventKind::RouteError => "ROUTE_ERROR",
            SimEventKind::TrackSelectionFailed => "TRACK_SELECTION_FAILED",
            SimEventKind::ResourceSnapshot => "RESOURCE_SNAPSHOT",
        }
    }
}

/// One simulation event. `timestamp` is in simulation ms.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EventRecord {
    pub timestamp: u64,
    pub kind: SimEventKind,
    pub entity_id: String,
    pub details: BTreeMap<String, String>,
}

/// Append-only collector for simulation events.
#[derive(Debug, Default, Resource)]
pub struct EventLog {
    pub records: Vec<EventRecord>,
}

impl EventLog {
    pub fn record(
        &mut self,
        timestamp: u64,
        kind: SimEventKind,
        entity_id: impl Into<String>,
        details: impl IntoIterator<Item = (&'static str, String)>,
    ) {
        self.records.push(EventRecord {
            timestamp,
            kind,
            entity_id: entity_id.into(),
            details: details
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        });
    }

    /// Record a wagon relocation.
    pub fn record_move(&mut self, timestamp: u64, wagon_id: &str, from: &str, to: &str) {
        self.record(
            timestamp,
            SimEventKind::WagonMoved,
            wagon_id,
            [("from", from.to_string()), ("to", to.to_string())],
        );
    }

    /// Record a recoverable routing failure (`severity=ERROR`).
    pub fn record_route_error(&mut self, timestamp: u64, entity_id: &str, detail: String) {
        self.record(
            timestamp,
            SimEventKind::RouteError,
            entity_id,
            [("severity", "ERROR".to_string()), ("detail", detail)],
        );
    }

    /// Record a recoverable "no track fits" failure (`severity=ERROR`).
    pub fn record_selection_failure(&mut self, timestamp: u64, entity_id: &str, detail: String) {
        self.record(
            timestamp,
            SimEventKind::TrackSelectionFailed,
            entity_id,
            [("severity", "ERROR".to_string()), ("detail", detail)],
        );
    }

    pub fn count(&self, kind: SimEventKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }
}

/// Set when an invariant violation stops the run. The runner refuses to pop
/// further events once a cause is present, which keeps the log exportable up
/// to the failure.
#[derive(Debug, Default, Resource)]
pub struct AbortState {
    pub cause: Option<String>,
}

impl AbortState {
    pub fn fail(&mut self, cause: impl Into<String>) {
        if self.cause.is_none() {
            self.cause = Some(cause.into());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.cause.is_some()
    }
}

/// Periodic resource snapshots into the event log; disabled when `None`.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct SnapshotConfig {
    pub interval_ms: Option<u64>,
}

/// Timestamp of the last captured snapshot.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct SnapshotState {
    pub last_snapshot_at: Option<u64>,
}
