//! Locomotive pool: FIFO store of idle locomotives.
//!
//! A locomotive is either in the pool or held by exactly one trip coordinator;
//! this is the only serialization between concurrent trips. The full roster is
//! retained for end-of-run utilization metrics regardless of availability.

use bevy_ecs::prelude::{Entity, Resource};

use crate::clock::SimulationClock;
use crate::store::{Store, Waiter};

#[derive(Debug, Default, Resource)]
pub struct LocomotivePool {
    store: Store<Entity>,
    all_locomotives: Vec<Entity>,
}

impl LocomotivePool {
    /// Register a locomotive and make it immediately available.
    pub fn add(&mut self, entity: Entity, clock: &mut SimulationClock) {
        self.all_locomotives.push(entity);
        self.store.put(entity, clock);
    }

    /// Take a locomotive, or park the caller for a FIFO wakeup when one is
    /// released.
    pub fn acquire(&mut self, waiter: Waiter) -> Option<Entity> {
        self.store.acquire(waiter)
    }

    /// Return a locomotive to the pool. Never blocks; wakes the head waiter.
    pub fn release(&mut self, entity: Entity, clock: &mut SimulationClock) {
        self.store.put(entity, clock);
    }

    pub fn available(&self) -> usize {
        self.store.len()
    }

    /// Every locomotive ever registered, in registration order.
    pub fn all_locomotives(&self) -> &[Entity] {
        &self.all_locomotives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::EventKind;

    #[test]
    fn pool_serves_waiters_in_fifo_order() {
        let mut world = bevy_ecs::prelude::World::new();
        let l1 = world.spawn_empty().id();
        let l2 = world.spawn_empty().id();

        let mut pool = LocomotivePool::default();
        let mut clock = SimulationClock::default();
        pool.add(l1, &mut clock);
        pool.add(l2, &mut clock);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.all_locomotives().len(), 2);

        let a = Waiter::new(EventKind::CollectionTripStep);
        let b = Waiter::new(EventKind::ParkingTripStep);
        assert_eq!(pool.acquire(a), Some(l1));
        assert_eq!(pool.acquire(b), Some(l2));
        assert_eq!(pool.acquire(a), None);
        assert_eq!(pool.acquire(b), None);

        pool.release(l1, &mut clock);
        // First release resumes the first waiter.
        assert_eq!(
            clock.pop_next().map(|e| e.kind),
            Some(EventKind::CollectionTripStep)
        );
        assert_eq!(pool.acquire(b), None);
        assert_eq!(pool.acquire(a), Some(l1));
    }
}
