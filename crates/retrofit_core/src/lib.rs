//! # Retrofit Workshop Simulation Core
//!
//! A discrete-event simulation engine for pop-up workshops that retrofit
//! freight wagons with Digital Automatic Couplers.
//!
//! ## Overview
//!
//! Trains of wagons arrive on a schedule; a small pool of shunting
//! locomotives moves wagon batches through a pipeline of tracks (collection,
//! retrofit staging, workshop, retrofitted staging, parking); workshops
//! process wagons in parallel at fixed stations. The engine reports
//! throughput, utilization, queue lengths, wait times and rejections.
//!
//! ## Key Concepts
//!
//! - **Discrete Events**: all progress happens through scheduled events;
//!   same-instant events run in enqueue order, so runs are reproducible.
//! - **Coordinators**: each pipeline stage is a resource-backed state machine
//!   advanced by its own event kinds.
//! - **Capacity**: tracks gate on length, workshops on station counts, trips
//!   on the locomotive pool.
//! - **Deterministic**: a single seeded RNG drives all RANDOM strategies.
//!
//! ## Example
//!
//! ```rust,no_run
//! use retrofit_core::runner::run;
//! use retrofit_core::scenario::Scenario;
//!
//! let scenario = Scenario::default(); // empty eight-hour window
//! let result = run(&scenario).expect("valid scenario");
//! println!("parked: {}", result.kpis.aggregate.wagons_parked);
//! ```

pub mod clock;
pub mod ecs;
pub mod metrics;
pub mod pool;
pub mod routes;
pub mod runner;
pub mod scenario;
pub mod selection;
pub mod store;
pub mod systems;
pub mod telemetry;
pub mod tracks;
pub mod workshops;

#[cfg(test)]
pub mod test_helpers;
