//! Workshop station accounting.
//!
//! Station counts are the sole retrofit throughput gate; they are independent
//! of track length. Occupied-station time is accumulated here so the
//! utilization KPI can be read off directly at the end of a run.

use bevy_ecs::prelude::Resource;

/// Station count violation. Fatal: indicates a coordinator bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationError {
    UnknownWorkshop(String),
    OccupyBeyondCapacity { workshop_id: String },
    ReleaseBeyondZero { workshop_id: String },
}

impl std::fmt::Display for StationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StationError::UnknownWorkshop(id) => write!(f, "unknown workshop {id}"),
            StationError::OccupyBeyondCapacity { workshop_id } => {
                write!(f, "workshop {workshop_id}: all stations already in use")
            }
            StationError::ReleaseBeyondZero { workshop_id } => {
                write!(f, "workshop {workshop_id}: released more stations than occupied")
            }
        }
    }
}

impl std::error::Error for StationError {}

#[derive(Debug, Clone)]
pub struct WorkshopState {
    pub workshop_id: String,
    pub track_id: String,
    pub retrofit_stations: u32,
    pub stations_in_use: u32,
    /// Accumulated occupied-station milliseconds up to `last_change_ms`.
    pub busy_station_ms: u64,
    pub last_change_ms: u64,
    pub completed_retrofits: u64,
    pub total_retrofit_ms: u64,
    pub total_waiting_ms: u64,
}

impl WorkshopState {
    pub fn available(&self) -> u32 {
        self.retrofit_stations - self.stations_in_use
    }

    /// In-use ratio in [0, 1].
    pub fn usage_ratio(&self) -> f64 {
        self.stations_in_use as f64 / self.retrofit_stations as f64
    }

    fn settle(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.last_change_ms);
        self.busy_station_ms += elapsed * self.stations_in_use as u64;
        self.last_change_ms = now;
    }

    /// Occupied-station milliseconds as of `now` (open occupations included).
    pub fn busy_station_ms_at(&self, now: u64) -> u64 {
        self.busy_station_ms
            + now.saturating_sub(self.last_change_ms) * self.stations_in_use as u64
    }
}

#[derive(Debug, Default, Resource)]
pub struct WorkshopCapacityManager {
    workshops: Vec<WorkshopState>,
}

impl WorkshopCapacityManager {
    pub fn insert(
        &mut self,
        workshop_id: impl Into<String>,
        track_id: impl Into<String>,
        retrofit_stations: u32,
    ) {
        self.workshops.push(WorkshopState {
            workshop_id: workshop_id.into(),
            track_id: track_id.into(),
            retrofit_stations,
            stations_in_use: 0,
            busy_station_ms: 0,
            last_change_ms: 0,
            completed_retrofits: 0,
            total_retrofit_ms: 0,
            total_waiting_ms: 0,
        });
    }

    /// All workshops in declared order.
    pub fn workshops(&self) -> &[WorkshopState] {
        &self.workshops
    }

    pub fn get(&self, idx: usize) -> Option<&WorkshopState> {
        self.workshops.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut WorkshopState> {
        self.workshops.get_mut(idx)
    }

    /// Index of the workshop attached to `track_id`.
    pub fn index_by_track(&self, track_id: &str) -> Option<usize> {
        self.workshops.iter().position(|w| w.track_id == track_id)
    }

    pub fn occupy(&mut self, idx: usize, now: u64) -> Result<(), StationError> {
        let w = self
            .workshops
            .get_mut(idx)
            .ok_or_else(|| StationError::UnknownWorkshop(idx.to_string()))?;
        if w.stations_in_use >= w.retrofit_stations {
            return Err(StationError::OccupyBeyondCapacity {
                workshop_id: w.workshop_id.clone(),
            });
        }
        w.settle(now);
        w.stations_in_use += 1;
        Ok(())
    }

    pub fn release(&mut self, idx: usize, now: u64) -> Result<(), StationError> {
        let w = self
            .workshops
            .get_mut(idx)
            .ok_or_else(|| StationError::UnknownWorkshop(idx.to_string()))?;
        if w.stations_in_use == 0 {
            return Err(StationError::ReleaseBeyondZero {
                workshop_id: w.workshop_id.clone(),
            });
        }
        w.settle(now);
        w.stations_in_use -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupy_release_bounds_are_enforced() {
        let mut m = WorkshopCapacityManager::default();
        m.insert("ws-a", "track-ws", 2);

        m.occupy(0, 0).unwrap();
        m.occupy(0, 0).unwrap();
        assert!(matches!(
            m.occupy(0, 0),
            Err(StationError::OccupyBeyondCapacity { .. })
        ));
        m.release(0, 10).unwrap();
        m.release(0, 10).unwrap();
        assert!(matches!(
            m.release(0, 10),
            Err(StationError::ReleaseBeyondZero { .. })
        ));
    }

    #[test]
    fn busy_time_accumulates_per_station() {
        let mut m = WorkshopCapacityManager::default();
        m.insert("ws-a", "track-ws", 2);

        m.occupy(0, 0).unwrap();
        m.occupy(0, 5).unwrap();
        m.release(0, 10).unwrap();
        // [0,5): one station, [5,10): two stations = 5 + 10.
        assert_eq!(m.get(0).unwrap().busy_station_ms, 15);
        // Open occupation extends to the query time.
        assert_eq!(m.get(0).unwrap().busy_station_ms_at(20), 25);
    }

    #[test]
    fn index_by_track_finds_workshop() {
        let mut m = WorkshopCapacityManager::default();
        m.insert("ws-a", "track-1", 1);
        m.insert("ws-b", "track-2", 3);
        assert_eq!(m.index_by_track("track-2"), Some(1));
        assert_eq!(m.index_by_track("track-9"), None);
    }
}
