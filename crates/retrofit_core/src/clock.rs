//! Simulation time: millisecond-scale discrete-event timeline.
//!
//! All timestamps and `clock.now()` are in **simulation milliseconds**; time 0
//! corresponds to the scenario start. The timeline advances by popping the next
//! scheduled event. Events at the same millisecond execute in enqueue order
//! (stable FIFO by a monotone sequence number), so repeated runs over the same
//! scenario produce identical event streams.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

/// One second in simulation milliseconds.
pub const ONE_SEC_MS: u64 = 1000;
/// One minute in simulation milliseconds.
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
/// One hour in simulation milliseconds.
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

/// Convert a duration in fractional minutes to whole simulation milliseconds.
pub fn minutes_to_ms(minutes: f64) -> u64 {
    (minutes * ONE_MIN_MS as f64).round().max(0.0) as u64
}

/// Convert simulation milliseconds to fractional minutes (for reports).
pub fn ms_to_minutes(ms: u64) -> f64 {
    ms as f64 / ONE_MIN_MS as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    SimulationStarted,
    TrainArrived,
    HumpWagon,
    CollectionTripWake,
    CollectionTripStep,
    StationAssign,
    WagonAtStation,
    RetrofitFinished,
    RetrofittedTripWake,
    RetrofittedTripStep,
    ParkingTripWake,
    ParkingTripStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSubject {
    Train(usize),
    Wagon(Entity),
    Locomotive(Entity),
}

/// Simulation event. `timestamp` is in **milliseconds** (simulation time);
/// `seq` is the enqueue sequence number used to break same-instant ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub seq: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by timestamp; same-instant events in enqueue (seq) order.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Simulation clock: time in **milliseconds**, advances to the next scheduled
/// event when popped. `now` never moves while continuations remain at the
/// current instant.
#[derive(Debug, Clone, Default, Resource)]
pub struct SimulationClock {
    now: u64,
    next_seq: u64,
    events: BinaryHeap<Event>,
}

impl SimulationClock {
    /// Current simulation time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Current simulation time in fractional minutes.
    pub fn now_mins(&self) -> f64 {
        ms_to_minutes(self.now)
    }

    /// Schedule an event at an absolute simulation timestamp (ms).
    pub fn schedule_at(&mut self, at_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        debug_assert!(at_ms >= self.now, "event timestamp must be >= current time");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Event {
            timestamp: at_ms,
            seq,
            kind,
            subject,
        });
    }

    /// Schedule an event at `now + delta_ms` (relative, in ms).
    pub fn schedule_in(&mut self, delta_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now.saturating_add(delta_ms), kind, subject);
    }

    /// Schedule an event in **delta_mins** fractional minutes from now.
    pub fn schedule_in_mins(
        &mut self,
        delta_mins: f64,
        kind: EventKind,
        subject: Option<EventSubject>,
    ) {
        self.schedule_in(minutes_to_ms(delta_mins), kind, subject);
    }

    /// Pop the next event (earliest timestamp; same-ms in enqueue order) and
    /// advance `now` to its timestamp.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    /// Timestamp of the next scheduled event without popping it.
    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|event| event.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events still in the queue (for tests and diagnostics).
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_pops_events_in_time_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(20, EventKind::TrainArrived, None);
        clock.schedule_at(5, EventKind::TrainArrived, None);
        clock.schedule_at(10, EventKind::HumpWagon, None);

        let first = clock.pop_next().expect("first event");
        assert_eq!(first.timestamp, 5);
        assert_eq!(clock.now(), 5);

        let second = clock.pop_next().expect("second event");
        assert_eq!(second.timestamp, 10);
        assert_eq!(second.kind, EventKind::HumpWagon);

        let third = clock.pop_next().expect("third event");
        assert_eq!(third.timestamp, 20);
        assert_eq!(clock.now(), 20);

        assert!(clock.pop_next().is_none());
        assert!(clock.is_empty());
    }

    #[test]
    fn same_instant_events_run_in_enqueue_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(7, EventKind::StationAssign, None);
        clock.schedule_at(7, EventKind::HumpWagon, None);
        clock.schedule_at(7, EventKind::ParkingTripWake, None);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| clock.pop_next())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::StationAssign,
                EventKind::HumpWagon,
                EventKind::ParkingTripWake
            ]
        );
    }

    #[test]
    fn minute_conversions_round_trip() {
        assert_eq!(minutes_to_ms(1.0), ONE_MIN_MS);
        assert_eq!(minutes_to_ms(0.5), 30 * ONE_SEC_MS);
        assert_eq!(minutes_to_ms(0.0), 0);
        assert_eq!(ms_to_minutes(ONE_HOUR_MS), 60.0);

        let mut clock = SimulationClock::default();
        clock.schedule_in_mins(2.5, EventKind::RetrofitFinished, None);
        let e = clock.pop_next().expect("event");
        assert_eq!(e.timestamp, 150 * ONE_SEC_MS);
        assert_eq!(clock.now_mins(), 2.5);
    }
}
