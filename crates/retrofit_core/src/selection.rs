//! Selection strategies and wagon eligibility.
//!
//! Strategies are tagged enums dispatched through pure functions; occupancy
//! ratios are computed once per call. The only RNG in the core lives here,
//! seeded from the scenario, so RANDOM selection is reproducible.

use bevy_ecs::prelude::{Res, ResMut, Resource};
use bevy_ecs::system::SystemParam;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use crate::ecs::{RejectionReason, Wagon};
use crate::scenario::StrategyConfig;
use crate::tracks::{TrackCapacityManager, TrackKind};
use crate::workshops::WorkshopCapacityManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackSelectionStrategy {
    LeastOccupied,
    FirstAvailable,
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkshopSelectionStrategy {
    LeastOccupied,
    FirstAvailable,
}

/// Selection scope for round-robin bookkeeping: each operation advances its
/// own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionScope {
    Collection,
    RetrofitStaging,
    RetrofittedStaging,
    Parking,
}

/// Per-scope round-robin cursors.
#[derive(Debug, Default, Resource)]
pub struct RoundRobinState {
    cursors: HashMap<SelectionScope, usize>,
}

/// Single RNG for all RANDOM strategy draws, seeded from the scenario.
#[derive(Debug, Resource)]
pub struct SelectionRng(pub StdRng);

impl SelectionRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

/// Choose a track among `candidates` (declared order) that can fit
/// `length_m`, according to `strategy`. Returns `None` when nothing fits.
pub fn select_track(
    tracks: &TrackCapacityManager,
    candidates: &[String],
    length_m: f64,
    strategy: TrackSelectionStrategy,
    scope: SelectionScope,
    round_robin: &mut RoundRobinState,
    rng: &mut SelectionRng,
) -> Option<String> {
    // Ratios are cached for the duration of this call.
    let fitting: Vec<(&String, f64)> = candidates
        .iter()
        .filter(|id| tracks.can_add(id, length_m))
        .map(|id| {
            let ratio = tracks.get(id).map(|t| t.occupancy_ratio()).unwrap_or(1.0);
            (id, ratio)
        })
        .collect();
    if fitting.is_empty() {
        return None;
    }

    let chosen = match strategy {
        TrackSelectionStrategy::FirstAvailable => fitting[0].0,
        TrackSelectionStrategy::LeastOccupied => {
            fitting
                .iter()
                .min_by(|(a_id, a_ratio), (b_id, b_ratio)| {
                    a_ratio
                        .partial_cmp(b_ratio)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a_id.cmp(b_id))
                })
                .map(|(id, _)| *id)?
        }
        TrackSelectionStrategy::RoundRobin => {
            let cursor = round_robin.cursors.entry(scope).or_insert(0);
            // Walk the full candidate ring from the cursor; first fit wins.
            let n = candidates.len();
            let mut picked = None;
            for step in 0..n {
                let candidate = &candidates[(*cursor + step) % n];
                if fitting.iter().any(|(id, _)| *id == candidate) {
                    *cursor = (*cursor + step + 1) % n;
                    picked = Some(candidate);
                    break;
                }
            }
            picked?
        }
        TrackSelectionStrategy::Random => fitting[rng.0.gen_range(0..fitting.len())].0,
    };
    Some(chosen.clone())
}

/// Choose a workshop with at least one free station. LEAST_OCCUPIED minimizes
/// the in-use ratio with ties broken by declared order.
pub fn select_workshop(
    workshops: &WorkshopCapacityManager,
    strategy: WorkshopSelectionStrategy,
) -> Option<usize> {
    let free: Vec<(usize, f64)> = workshops
        .workshops()
        .iter()
        .enumerate()
        .filter(|(_, w)| w.available() > 0)
        .map(|(i, w)| (i, w.usage_ratio()))
        .collect();
    if free.is_empty() {
        return None;
    }
    match strategy {
        WorkshopSelectionStrategy::FirstAvailable => Some(free[0].0),
        WorkshopSelectionStrategy::LeastOccupied => free
            .iter()
            .min_by(|(a_idx, a_ratio), (b_idx, b_ratio)| {
                a_ratio
                    .partial_cmp(b_ratio)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a_idx.cmp(b_idx))
            })
            .map(|(i, _)| *i),
    }
}

/// Bundled world access for track choices: capacity manager, configured
/// strategies, round-robin cursors and the scenario RNG.
#[derive(SystemParam)]
pub struct TrackSelector<'w> {
    pub tracks: ResMut<'w, TrackCapacityManager>,
    pub strategies: Res<'w, StrategyConfig>,
    pub round_robin: ResMut<'w, RoundRobinState>,
    pub rng: ResMut<'w, SelectionRng>,
}

impl TrackSelector<'_> {
    /// Choose a track of `kind` that fits `length_m` using `strategy`.
    pub fn select(
        &mut self,
        kind: TrackKind,
        length_m: f64,
        strategy: TrackSelectionStrategy,
        scope: SelectionScope,
    ) -> Option<String> {
        let candidates = self.tracks.ids_of_kind(kind);
        select_track(
            &self.tracks,
            &candidates,
            length_m,
            strategy,
            scope,
            &mut self.round_robin,
            &mut self.rng,
        )
    }
}

/// Wagon eligibility policy for the arrival selector.
#[derive(Debug, Clone, Copy, Resource)]
pub struct EligibilityPolicy {
    /// Retrofit loaded wagons instead of rejecting them.
    pub retrofit_loaded_wagons: bool,
    /// Route wagons that do not need a retrofit to parking instead of
    /// rejecting them.
    pub park_non_retrofit_wagons: bool,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            retrofit_loaded_wagons: false,
            park_non_retrofit_wagons: false,
        }
    }
}

/// Outcome of the arrival selector for one wagon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Eligible for the workshop pipeline.
    Retrofit,
    /// Bypasses the workshop; goes to parking.
    ParkOnly,
    Reject(RejectionReason),
}

pub fn evaluate_wagon(wagon: &Wagon, policy: &EligibilityPolicy) -> SelectionOutcome {
    if wagon.is_loaded && !policy.retrofit_loaded_wagons {
        return SelectionOutcome::Reject(RejectionReason::IneligibleLoaded);
    }
    if !wagon.needs_retrofit {
        return if policy.park_non_retrofit_wagons {
            SelectionOutcome::ParkOnly
        } else {
            SelectionOutcome::Reject(RejectionReason::IneligibleNotFlagged)
        };
    }
    SelectionOutcome::Retrofit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::TrackKind;

    fn parking_manager() -> (TrackCapacityManager, Vec<String>) {
        let mut m = TrackCapacityManager::default();
        m.insert("park-1", TrackKind::Parking, 100.0);
        m.insert("park-2", TrackKind::Parking, 100.0);
        m.insert("park-3", TrackKind::Parking, 100.0);
        m.add("park-1", 30.0).unwrap();
        m.add("park-2", 10.0).unwrap();
        m.add("park-3", 20.0).unwrap();
        let candidates = m.ids_of_kind(TrackKind::Parking);
        (m, candidates)
    }

    #[test]
    fn least_occupied_picks_lowest_ratio() {
        let (m, candidates) = parking_manager();
        let mut rr = RoundRobinState::default();
        let mut rng = SelectionRng::from_seed(1);
        let chosen = select_track(
            &m,
            &candidates,
            20.0,
            TrackSelectionStrategy::LeastOccupied,
            SelectionScope::Parking,
            &mut rr,
            &mut rng,
        );
        assert_eq!(chosen.as_deref(), Some("park-2"));
    }

    #[test]
    fn first_available_takes_declared_order() {
        let (m, candidates) = parking_manager();
        let mut rr = RoundRobinState::default();
        let mut rng = SelectionRng::from_seed(1);
        let chosen = select_track(
            &m,
            &candidates,
            20.0,
            TrackSelectionStrategy::FirstAvailable,
            SelectionScope::Parking,
            &mut rr,
            &mut rng,
        );
        assert_eq!(chosen.as_deref(), Some("park-1"));
    }

    #[test]
    fn round_robin_advances_per_scope() {
        let (m, candidates) = parking_manager();
        let mut rr = RoundRobinState::default();
        let mut rng = SelectionRng::from_seed(1);
        let mut pick = |scope| {
            select_track(
                &m,
                &candidates,
                20.0,
                TrackSelectionStrategy::RoundRobin,
                scope,
                &mut rr,
                &mut rng,
            )
            .unwrap()
        };
        assert_eq!(pick(SelectionScope::Parking), "park-1");
        assert_eq!(pick(SelectionScope::Parking), "park-2");
        // A different scope keeps its own cursor.
        assert_eq!(pick(SelectionScope::Collection), "park-1");
        assert_eq!(pick(SelectionScope::Parking), "park-3");
        assert_eq!(pick(SelectionScope::Parking), "park-1");
    }

    #[test]
    fn random_is_stable_for_a_fixed_seed() {
        let (m, candidates) = parking_manager();
        let mut first_run = None;
        for _ in 0..3 {
            let mut rr = RoundRobinState::default();
            let mut rng = SelectionRng::from_seed(4711);
            let chosen = select_track(
                &m,
                &candidates,
                20.0,
                TrackSelectionStrategy::Random,
                SelectionScope::Parking,
                &mut rr,
                &mut rng,
            )
            .unwrap();
            match &first_run {
                None => first_run = Some(chosen),
                Some(prev) => assert_eq!(*prev, chosen),
            }
        }
    }

    #[test]
    fn nothing_fits_returns_none() {
        let (m, candidates) = parking_manager();
        let mut rr = RoundRobinState::default();
        let mut rng = SelectionRng::from_seed(1);
        let chosen = select_track(
            &m,
            &candidates,
            95.0,
            TrackSelectionStrategy::FirstAvailable,
            SelectionScope::Parking,
            &mut rr,
            &mut rng,
        );
        assert_eq!(chosen, None);
    }

    #[test]
    fn workshop_selection_respects_strategy() {
        let mut m = WorkshopCapacityManager::default();
        m.insert("ws-a", "t-a", 2);
        m.insert("ws-b", "t-b", 4);
        m.occupy(0, 0).unwrap();
        m.occupy(1, 0).unwrap();
        // ws-a at 1/2, ws-b at 1/4.
        assert_eq!(
            select_workshop(&m, WorkshopSelectionStrategy::LeastOccupied),
            Some(1)
        );
        assert_eq!(
            select_workshop(&m, WorkshopSelectionStrategy::FirstAvailable),
            Some(0)
        );
        m.occupy(0, 0).unwrap();
        for _ in 0..3 {
            m.occupy(1, 0).unwrap();
        }
        assert_eq!(
            select_workshop(&m, WorkshopSelectionStrategy::FirstAvailable),
            None
        );
    }

    #[test]
    fn eligibility_follows_policy_flags() {
        let loaded = Wagon::new("w1", "t", 20.0, true, true, 0);
        let no_retrofit = Wagon::new("w2", "t", 20.0, false, false, 0);
        let eligible = Wagon::new("w3", "t", 20.0, false, true, 0);

        let default_policy = EligibilityPolicy::default();
        assert_eq!(
            evaluate_wagon(&loaded, &default_policy),
            SelectionOutcome::Reject(RejectionReason::IneligibleLoaded)
        );
        assert_eq!(
            evaluate_wagon(&no_retrofit, &default_policy),
            SelectionOutcome::Reject(RejectionReason::IneligibleNotFlagged)
        );
        assert_eq!(
            evaluate_wagon(&eligible, &default_policy),
            SelectionOutcome::Retrofit
        );

        let permissive = EligibilityPolicy {
            retrofit_loaded_wagons: true,
            park_non_retrofit_wagons: true,
        };
        assert_eq!(
            evaluate_wagon(&loaded, &permissive),
            SelectionOutcome::Retrofit
        );
        assert_eq!(
            evaluate_wagon(&no_retrofit, &permissive),
            SelectionOutcome::ParkOnly
        );
    }
}
