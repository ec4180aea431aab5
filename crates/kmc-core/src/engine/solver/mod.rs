//! Event-selection solvers.
//!
//! A solver owns the list of currently possible events and their propensities.
//! It is bulk-loaded at the start of every run, updated incrementally after each
//! executed event, and asked to pick the next event with probability proportional
//! to its propensity while advancing the simulation clock.
//!
//! - [`BinaryTreeSolver`]: a complete binary tree of partial sums, `O(log n)`
//!   updates and selection regardless of how propensities are distributed.
//! - [`DynamicSchulzeSolver`]: events grouped into buckets of equal propensity,
//!   very fast when only a handful of distinct propensities exist.

mod binary_tree;
mod dynamic_schulze;

pub use binary_tree::BinaryTreeSolver;
pub use dynamic_schulze::DynamicSchulzeSolver;

use super::config::SolverId;
use super::error::EngineError;
use super::event_id::{EventId, EventIdLayout};
use crate::core::rng::RandNumGen;

pub trait Solver: Send {
    /// Discards every event and prepares for bulk loading.
    fn begin_building_event_list(
        &mut self,
        layout: &EventIdLayout,
        num_over_lattice_events: usize,
        planes_reserved: usize,
    );

    /// Adds an event during bulk loading; `propensity` must be positive.
    fn add_cell_centered_entry(&mut self, eid: EventId, propensity: f64);

    /// Adds an over-lattice event during bulk loading; `propensity` must be positive.
    fn add_over_lattice_entry(&mut self, eid: EventId, propensity: f64);

    fn end_building_event_list(&mut self) {}

    /// Inserts, re-weights or (for non-positive `propensity`) removes an event.
    fn add_or_update_cell_centered_entry(&mut self, eid: EventId, propensity: f64);

    /// Picks the next event and adds an exponentially distributed waiting
    /// time to `time`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoEvents`] if the event list is empty.
    fn choose_event_id_and_update_time(
        &mut self,
        rng: &mut dyn RandNumGen,
        time: &mut f64,
    ) -> Result<EventId, EngineError>;

    fn no_more_events(&self) -> bool;

    fn num_events(&self) -> usize;

    /// Sum of the propensities of every event in the list.
    fn total_propensity(&self) -> f64;
}

pub fn mk_solver(id: SolverId) -> Box<dyn Solver> {
    match id {
        SolverId::DynamicSchulze => Box::new(DynamicSchulzeSolver::new()),
        SolverId::BinaryTree => Box::new(BinaryTreeSolver::new()),
    }
}
