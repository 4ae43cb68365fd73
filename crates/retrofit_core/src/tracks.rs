//! Track capacity accounting: length-based occupancy per track.
//!
//! Tracks are held in declared order so that candidate enumeration (and with
//! it every selection strategy) is deterministic. Occupancy preconditions are
//! enforced on every mutation; a violation is a coordinator bug and aborts the
//! run. Workshop tracks are exempt from the upper bound: station count, not
//! track length, gates retrofit throughput, so wagons parked at stations may
//! overflow the nominal length.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackKind {
    Collection,
    Retrofit,
    Workshop,
    Retrofitted,
    Parking,
    ResourceParking,
    Mainline,
}

impl TrackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Collection => "COLLECTION",
            TrackKind::Retrofit => "RETROFIT",
            TrackKind::Workshop => "WORKSHOP",
            TrackKind::Retrofitted => "RETROFITTED",
            TrackKind::Parking => "PARKING",
            TrackKind::ResourceParking => "RESOURCE_PARKING",
            TrackKind::Mainline => "MAINLINE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackState {
    pub track_id: String,
    pub kind: TrackKind,
    pub length_m: f64,
    pub occupied_m: f64,
    pub peak_occupied_m: f64,
}

impl TrackState {
    pub fn free_m(&self) -> f64 {
        self.length_m - self.occupied_m
    }

    /// Occupancy ratio in [0, 1] (or above 1 for overflowed workshop tracks).
    pub fn occupancy_ratio(&self) -> f64 {
        if self.length_m <= 0.0 {
            1.0
        } else {
            self.occupied_m / self.length_m
        }
    }
}

/// Occupancy precondition violation. Fatal: the run aborts with this cause.
#[derive(Debug, Clone, PartialEq)]
pub enum CapacityError {
    UnknownTrack(String),
    Overflow {
        track_id: String,
        occupied_m: f64,
        requested_m: f64,
        length_m: f64,
    },
    Underflow {
        track_id: String,
        occupied_m: f64,
        requested_m: f64,
    },
}

impl std::fmt::Display for CapacityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityError::UnknownTrack(id) => write!(f, "unknown track {id}"),
            CapacityError::Overflow {
                track_id,
                occupied_m,
                requested_m,
                length_m,
            } => write!(
                f,
                "track {track_id}: adding {requested_m}m to {occupied_m}m exceeds {length_m}m"
            ),
            CapacityError::Underflow {
                track_id,
                occupied_m,
                requested_m,
            } => write!(
                f,
                "track {track_id}: removing {requested_m}m from {occupied_m}m"
            ),
        }
    }
}

impl std::error::Error for CapacityError {}

#[derive(Debug, Default, Resource)]
pub struct TrackCapacityManager {
    tracks: Vec<TrackState>,
    index: HashMap<String, usize>,
}

impl TrackCapacityManager {
    pub fn insert(&mut self, track_id: impl Into<String>, kind: TrackKind, length_m: f64) {
        let track_id = track_id.into();
        self.index.insert(track_id.clone(), self.tracks.len());
        self.tracks.push(TrackState {
            track_id,
            kind,
            length_m,
            occupied_m: 0.0,
            peak_occupied_m: 0.0,
        });
    }

    pub fn get(&self, track_id: &str) -> Option<&TrackState> {
        self.index.get(track_id).map(|&i| &self.tracks[i])
    }

    /// All tracks in declared order.
    pub fn tracks(&self) -> &[TrackState] {
        &self.tracks
    }

    /// Track ids of a kind, in declared order.
    pub fn ids_of_kind(&self, kind: TrackKind) -> Vec<String> {
        self.tracks
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.track_id.clone())
            .collect()
    }

    pub fn can_add(&self, track_id: &str, length_m: f64) -> bool {
        self.get(track_id)
            .map(|t| t.occupied_m + length_m <= t.length_m + f64::EPSILON)
            .unwrap_or(false)
    }

    /// Add occupancy, enforcing the track length bound.
    pub fn add(&mut self, track_id: &str, length_m: f64) -> Result<(), CapacityError> {
        let idx = *self
            .index
            .get(track_id)
            .ok_or_else(|| CapacityError::UnknownTrack(track_id.to_string()))?;
        let track = &mut self.tracks[idx];
        if track.occupied_m + length_m > track.length_m + f64::EPSILON {
            return Err(CapacityError::Overflow {
                track_id: track.track_id.clone(),
                occupied_m: track.occupied_m,
                requested_m: length_m,
                length_m: track.length_m,
            });
        }
        track.occupied_m += length_m;
        track.peak_occupied_m = track.peak_occupied_m.max(track.occupied_m);
        Ok(())
    }

    /// Add occupancy without the length bound (workshop tracks only).
    pub fn add_overflow(&mut self, track_id: &str, length_m: f64) -> Result<(), CapacityError> {
        let idx = *self
            .index
            .get(track_id)
            .ok_or_else(|| CapacityError::UnknownTrack(track_id.to_string()))?;
        let track = &mut self.tracks[idx];
        track.occupied_m += length_m;
        track.peak_occupied_m = track.peak_occupied_m.max(track.occupied_m);
        Ok(())
    }

    pub fn remove(&mut self, track_id: &str, length_m: f64) -> Result<(), CapacityError> {
        let idx = *self
            .index
            .get(track_id)
            .ok_or_else(|| CapacityError::UnknownTrack(track_id.to_string()))?;
        let track = &mut self.tracks[idx];
        if track.occupied_m - length_m < -f64::EPSILON {
            return Err(CapacityError::Underflow {
                track_id: track.track_id.clone(),
                occupied_m: track.occupied_m,
                requested_m: length_m,
            });
        }
        track.occupied_m = (track.occupied_m - length_m).max(0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TrackCapacityManager {
        let mut m = TrackCapacityManager::default();
        m.insert("col-1", TrackKind::Collection, 100.0);
        m.insert("col-2", TrackKind::Collection, 50.0);
        m.insert("ws-1", TrackKind::Workshop, 30.0);
        m
    }

    #[test]
    fn add_and_remove_update_occupancy() {
        let mut m = manager();
        m.add("col-1", 60.0).unwrap();
        m.add("col-1", 40.0).unwrap();
        assert!(!m.can_add("col-1", 0.5));
        m.remove("col-1", 40.0).unwrap();
        let t = m.get("col-1").unwrap();
        assert_eq!(t.occupied_m, 60.0);
        assert_eq!(t.peak_occupied_m, 100.0);
    }

    #[test]
    fn overflow_and_underflow_are_errors() {
        let mut m = manager();
        assert!(matches!(
            m.add("col-2", 51.0),
            Err(CapacityError::Overflow { .. })
        ));
        assert!(matches!(
            m.remove("col-2", 1.0),
            Err(CapacityError::Underflow { .. })
        ));
        assert!(matches!(
            m.add("nope", 1.0),
            Err(CapacityError::UnknownTrack(_))
        ));
    }

    #[test]
    fn workshop_tracks_may_overflow() {
        let mut m = manager();
        m.add_overflow("ws-1", 45.0).unwrap();
        let t = m.get("ws-1").unwrap();
        assert_eq!(t.occupied_m, 45.0);
        assert!(t.occupancy_ratio() > 1.0);
    }

    #[test]
    fn ids_of_kind_preserves_declared_order() {
        let m = manager();
        assert_eq!(m.ids_of_kind(TrackKind::Collection), vec!["col-1", "col-2"]);
        assert!(m.ids_of_kind(TrackKind::Parking).is_empty());
    }
}
