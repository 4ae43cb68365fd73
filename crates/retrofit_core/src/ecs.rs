//! Components and state enums for wagons and shunting locomotives.
//!
//! `WagonStatus` encodes the wagon lifecycle as an explicit transition table;
//! a forbidden transition is an implementation bug and surfaces as a
//! [`TransitionError`] that aborts the run. Timestamps for the retrofit funnel
//! are captured on entry to the corresponding status.

use bevy_ecs::prelude::Component;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WagonStatus {
    Arriving,
    Selecting,
    Selected,
    Rejected,
    Moving,
    OnRetrofitTrack,
    MovingToStation,
    Retrofitting,
    Retrofitted,
    MovingToParking,
    Parked,
}

impl WagonStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WagonStatus::Parked | WagonStatus::Rejected)
    }

    /// Whether the lifecycle permits moving from `self` to `to`.
    pub fn can_transition_to(self, to: WagonStatus) -> bool {
        use WagonStatus::*;
        matches!(
            (self, to),
            (Arriving, Selecting)
                | (Selecting, Selected)
                | (Selecting, Rejected)
                | (Selected, Moving)
                | (Selected, MovingToParking)
                | (Moving, OnRetrofitTrack)
                | (Moving, Retrofitted)
                | (OnRetrofitTrack, MovingToStation)
                | (MovingToStation, Retrofitting)
                | (Retrofitting, Retrofitted)
                | (Retrofitted, Moving)
                | (Retrofitted, MovingToParking)
                | (MovingToParking, Parked)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WagonStatus::Arriving => "ARRIVING",
            WagonStatus::Selecting => "SELECTING",
            WagonStatus::Selected => "SELECTED",
            WagonStatus::Rejected => "REJECTED",
            WagonStatus::Moving => "MOVING",
            WagonStatus::OnRetrofitTrack => "ON_RETROFIT_TRACK",
            WagonStatus::MovingToStation => "MOVING_TO_STATION",
            WagonStatus::Retrofitting => "RETROFITTING",
            WagonStatus::Retrofitted => "RETROFITTED",
            WagonStatus::MovingToParking => "MOVING_TO_PARKING",
            WagonStatus::Parked => "PARKED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Loaded wagon and the policy does not retrofit loaded wagons.
    IneligibleLoaded,
    /// Wagon not flagged for retrofit.
    IneligibleNotFlagged,
    /// No collection track can fit the wagon.
    NoCollectionTrackFits,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::IneligibleLoaded => "INELIGIBLE_LOADED",
            RejectionReason::IneligibleNotFlagged => "INELIGIBLE_NOT_FLAGGED",
            RejectionReason::NoCollectionTrackFits => "NO_COLLECTION_TRACK_FITS",
        }
    }
}

/// Attempted transition forbidden by the lifecycle table. Fatal: indicates a
/// coordinator bug, not bad input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub wagon_id: String,
    pub from: WagonStatus,
    pub to: WagonStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "wagon {}: illegal status transition {} -> {}",
            self.wagon_id,
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug, Clone, Component)]
pub struct Wagon {
    pub wagon_id: String,
    pub train_id: String,
    pub length_m: f64,
    pub is_loaded: bool,
    pub needs_retrofit: bool,
    pub status: WagonStatus,
    /// Track currently occupied (None while coupled and in transit).
    pub track_id: Option<String>,
    pub source_track_id: Option<String>,
    pub destination_track_id: Option<String>,
    /// Simulation ms when the wagon's train arrived.
    pub arrival_time: u64,
    /// Simulation ms when the wagon was decoupled onto a retrofit track.
    pub retrofit_track_arrival_time: Option<u64>,
    pub retrofit_start_time: Option<u64>,
    pub retrofit_end_time: Option<u64>,
    /// Simulation ms when the wagon reached a terminal status.
    pub finished_time: Option<u64>,
    pub rejection_reason: Option<RejectionReason>,
}

impl Wagon {
    pub fn new(
        wagon_id: impl Into<String>,
        train_id: impl Into<String>,
        length_m: f64,
        is_loaded: bool,
        needs_retrofit: bool,
        arrival_time: u64,
    ) -> Self {
        Self {
            wagon_id: wagon_id.into(),
            train_id: train_id.into(),
            length_m,
            is_loaded,
            needs_retrofit,
            status: WagonStatus::Arriving,
            track_id: None,
            source_track_id: None,
            destination_track_id: None,
            arrival_time,
            retrofit_track_arrival_time: None,
            retrofit_start_time: None,
            retrofit_end_time: None,
            finished_time: None,
            rejection_reason: None,
        }
    }

    /// Move to `to`, capturing funnel timestamps on entry. Fails on any
    /// transition the lifecycle table forbids (including out of a terminal
    /// status).
    pub fn transition(&mut self, now: u64, to: WagonStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                wagon_id: self.wagon_id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        match to {
            WagonStatus::OnRetrofitTrack => self.retrofit_track_arrival_time = Some(now),
            WagonStatus::Retrofitting => self.retrofit_start_time = Some(now),
            WagonStatus::Retrofitted if self.retrofit_start_time.is_some() => {
                // Only the workshop exit records the end; later re-entries to
                // RETROFITTED (staging arrival) keep the original timestamp.
                if self.retrofit_end_time.is_none() {
                    self.retrofit_end_time = Some(now);
                }
            }
            WagonStatus::Parked | WagonStatus::Rejected => self.finished_time = Some(now),
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocomotiveStatus {
    Parking,
    Moving,
    Coupling,
    Decoupling,
}

impl LocomotiveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LocomotiveStatus::Parking => "PARKING",
            LocomotiveStatus::Moving => "MOVING",
            LocomotiveStatus::Coupling => "COUPLING",
            LocomotiveStatus::Decoupling => "DECOUPLING",
        }
    }
}

#[derive(Debug, Clone, Component)]
pub struct Locomotive {
    pub locomotive_id: String,
    pub home_track_id: String,
    pub status: LocomotiveStatus,
    pub track_id: String,
    /// Timestamped status transitions, used for utilization KPIs.
    pub status_history: Vec<(u64, LocomotiveStatus)>,
}

impl Locomotive {
    pub fn new(locomotive_id: impl Into<String>, home_track_id: impl Into<String>) -> Self {
        let home = home_track_id.into();
        Self {
            locomotive_id: locomotive_id.into(),
            home_track_id: home.clone(),
            status: LocomotiveStatus::Parking,
            track_id: home,
            status_history: vec![(0, LocomotiveStatus::Parking)],
        }
    }

    /// Record a status change at `now`. No-op when the status is unchanged.
    pub fn set_status(&mut self, now: u64, status: LocomotiveStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.status_history.push((now, status));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_follows_happy_path() {
        let mut wagon = Wagon::new("w1", "t1", 20.0, false, true, 0);
        let path = [
            WagonStatus::Selecting,
            WagonStatus::Selected,
            WagonStatus::Moving,
            WagonStatus::OnRetrofitTrack,
            WagonStatus::MovingToStation,
            WagonStatus::Retrofitting,
            WagonStatus::Retrofitted,
            WagonStatus::Moving,
            WagonStatus::Retrofitted,
            WagonStatus::MovingToParking,
            WagonStatus::Parked,
        ];
        for (i, status) in path.iter().enumerate() {
            wagon
                .transition(i as u64 * 1000, *status)
                .expect("legal transition");
        }
        assert!(wagon.status.is_terminal());
        assert_eq!(wagon.retrofit_start_time, Some(5000));
        assert_eq!(wagon.retrofit_end_time, Some(6000));
        assert_eq!(wagon.finished_time, Some(10_000));
    }

    #[test]
    fn terminal_status_rejects_further_transitions() {
        let mut wagon = Wagon::new("w1", "t1", 20.0, false, true, 0);
        wagon.transition(0, WagonStatus::Selecting).unwrap();
        wagon.transition(0, WagonStatus::Rejected).unwrap();
        let err = wagon
            .transition(1, WagonStatus::Selected)
            .expect_err("terminal");
        assert_eq!(err.from, WagonStatus::Rejected);
    }

    #[test]
    fn illegal_jump_is_rejected() {
        let mut wagon = Wagon::new("w2", "t1", 20.0, false, true, 0);
        assert!(wagon.transition(0, WagonStatus::Retrofitting).is_err());
        assert_eq!(wagon.status, WagonStatus::Arriving);
    }

    #[test]
    fn staging_arrival_keeps_original_retrofit_end() {
        let mut wagon = Wagon::new("w3", "t1", 20.0, false, true, 0);
        for (t, s) in [
            (0, WagonStatus::Selecting),
            (0, WagonStatus::Selected),
            (1, WagonStatus::Moving),
            (2, WagonStatus::OnRetrofitTrack),
            (2, WagonStatus::MovingToStation),
            (3, WagonStatus::Retrofitting),
            (13, WagonStatus::Retrofitted),
            (14, WagonStatus::Moving),
            (15, WagonStatus::Retrofitted),
        ] {
            wagon.transition(t, s).unwrap();
        }
        assert_eq!(wagon.retrofit_end_time, Some(13));
    }

    #[test]
    fn locomotive_history_records_changes_once() {
        let mut loco = Locomotive::new("l1", "depot");
        assert!(loco.set_status(5, LocomotiveStatus::Moving));
        assert!(!loco.set_status(5, LocomotiveStatus::Moving));
        assert!(loco.set_status(9, LocomotiveStatus::Parking));
        assert_eq!(
            loco.status_history,
            vec![
                (0, LocomotiveStatus::Parking),
                (5, LocomotiveStatus::Moving),
                (9, LocomotiveStatus::Parking)
            ]
        );
    }
}
