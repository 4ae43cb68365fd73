//! Event-reacting systems: the five pipeline coordinators plus snapshots.
//!
//! Each coordinator is a resource-backed state machine advanced by its own
//! event kinds; the runner dispatches events to systems via `run_if`
//! conditions. All state mutation happens inside a single event step, so
//! multi-step resource updates are atomic between suspension points.

pub mod arrival;
pub mod collection_trip;
pub mod parking_trip;
pub mod retrofitted_trip;
pub mod snapshot;
pub mod workshop;

use crate::ecs::{Locomotive, LocomotiveStatus, Wagon, WagonStatus};
use crate::telemetry::{AbortState, EventLog, SimEventKind};

/// Record a locomotive status change in its history and the event log.
pub(crate) fn set_locomotive_status(
    locomotive: &mut Locomotive,
    now: u64,
    status: LocomotiveStatus,
    log: &mut EventLog,
) {
    if locomotive.set_status(now, status) {
        log.record(
            now,
            SimEventKind::LocomotiveStatusChanged,
            locomotive.locomotive_id.clone(),
            [
                ("status", status.as_str().to_string()),
                ("track", locomotive.track_id.clone()),
            ],
        );
    }
}

/// Apply a wagon status transition; a forbidden transition aborts the run.
pub(crate) fn transition_or_abort(
    wagon: &mut Wagon,
    now: u64,
    to: WagonStatus,
    abort: &mut AbortState,
) -> bool {
    match wagon.transition(now, to) {
        Ok(()) => true,
        Err(err) => {
            abort.fail(err.to_string());
            false
        }
    }
}

/// Turn a capacity/station precondition violation into an abort.
pub(crate) fn check_or_abort<E: std::fmt::Display>(
    result: Result<(), E>,
    abort: &mut AbortState,
) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            abort.fail(err.to_string());
            false
        }
    }
}
