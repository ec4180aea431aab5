//! # Engine Module
//!
//! The kinetic Monte Carlo driver and everything it needs to select, execute
//! and schedule events.
//!
//! ## Overview
//!
//! A [`simulation::Simulation`] owns the lattice and a list of every event that
//! is currently possible, each weighted by its propensity. At each step a
//! [`solver`] picks one event with probability proportional to its propensity
//! and advances the clock by an exponentially distributed waiting time. The
//! event's executor then modifies the lattice, and the propensities of every
//! event that could have been affected are re-evaluated.
//!
//! ## Architecture
//!
//! - **Driver** ([`simulation`]) - Event registration, the run loop and incremental updates
//! - **Selection** ([`solver`]) - Binary-tree and dynamic Schulze solvers
//! - **Identifiers** ([`event_id`], [`event_id_map`]) - Compact event ids and id-indexed storage
//! - **Executors** ([`executor`]) - Callback types and executor groups
//! - **Configuration** ([`config`]) - Solver choice, scheme variables and workflow settings
//! - **State Tracking** ([`state`]) - Clock and counters visible to callbacks
//! - **Progress Monitoring** ([`progress`]) - Progress reporting for long runs
//! - **Error Handling** ([`error`]) - Engine error type
//!
//! ## Key Capabilities
//!
//! - **Incremental propensity updates** driven by recorded or declared lattice changes
//! - **Two interchangeable solvers** with identical sampling behavior
//! - **Parallel event-list rebuilds** across the cells of each plane
//! - **Time- and step-periodic actions** for snapshots and analysis

pub mod config;
pub mod error;
pub mod event_id;
pub mod event_id_map;
pub mod executor;
pub(crate) mod periodic;
pub mod progress;
pub(crate) mod registry;
pub mod simulation;
pub mod solver;
pub mod state;
