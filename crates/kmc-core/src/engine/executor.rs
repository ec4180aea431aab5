use super::error::EngineError;
use super::state::SimulationState;
use crate::core::cell::CellInds;
use crate::core::cells_to_change::CellsToChange;
use crate::core::lattice::Lattice;
use crate::core::neighbors::{CellNeighOffsets, CellNeighProbe};

/// Executes an event; every write to the lattice is recorded so the
/// simulation can refresh the events that depend on it.
pub type EventExecutorAutoTrack =
    Box<dyn FnMut(&CellInds, &SimulationState, &mut Lattice) + Send>;

/// Executes an event, declaring the cells it changes through the
/// [`CellsToChange`] slice instead of having every write recorded.
pub type EventExecutorSemiManualTrack =
    Box<dyn FnMut(&CellInds, &SimulationState, &mut Lattice, &mut [CellsToChange]) + Send>;

/// Computes the propensities of every event of a group at the probe's center.
/// The slice arrives zeroed with one entry per event of the group.
pub type CellCenteredGroupPropensities =
    Box<dyn Fn(&CellNeighProbe<'_>, &mut [f64]) + Send + Sync>;

/// Runs between events at fixed intervals of time or of steps.
pub type PeriodicAction = Box<dyn FnMut(&SimulationState, &mut Lattice) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventExecutorType {
    AutoTrack,
    SemiManualTrack,
}

pub(crate) enum EventExecutor {
    AutoTrack(EventExecutorAutoTrack),
    SemiManualTrack {
        exec: EventExecutorSemiManualTrack,
        cno_vec: Vec<CellNeighOffsets>,
    },
}

impl EventExecutor {
    pub(crate) fn executor_type(&self) -> EventExecutorType {
        match self {
            EventExecutor::AutoTrack(_) => EventExecutorType::AutoTrack,
            EventExecutor::SemiManualTrack { .. } => EventExecutorType::SemiManualTrack,
        }
    }
}

/// The executors of all events that share one propensity function.
///
/// Slot `n` of the group corresponds to entry `n` of the propensity slice.
#[derive(Default)]
pub struct EventExecutorGroup {
    executors: Vec<Option<EventExecutor>>,
}

impl std::fmt::Debug for EventExecutorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.executors
                    .iter()
                    .map(|e| e.as_ref().map(EventExecutor::executor_type)),
            )
            .finish()
    }
}

impl EventExecutorGroup {
    pub fn new(num_events: usize) -> Self {
        let mut group = Self::default();
        group.reset_group(num_events);
        group
    }

    pub fn reset_group(&mut self, num_events: usize) {
        self.executors.clear();
        self.executors.resize_with(num_events, || None);
    }

    pub fn clear_group(&mut self) {
        self.executors.clear();
    }

    pub fn num_event_executors(&self) -> usize {
        self.executors.len()
    }

    fn slot(&mut self, which: usize) -> Result<&mut Option<EventExecutor>, EngineError> {
        self.executors.get_mut(which).ok_or_else(|| {
            EngineError::InvalidOperation(format!("Event index {which} is out of bounds."))
        })
    }

    pub fn add_event_executor(
        &mut self,
        which: usize,
        exec: impl FnMut(&CellInds, &SimulationState, &mut Lattice) + Send + 'static,
    ) -> Result<(), EngineError> {
        *self.slot(which)? = Some(EventExecutor::AutoTrack(Box::new(exec)));
        Ok(())
    }

    /// Adds an executor that declares the cells it changes. Element `n` of
    /// `cno_vec` defines the offsets of element `n` of the [`CellsToChange`]
    /// slice the executor receives.
    pub fn add_event_executor_semi_manual(
        &mut self,
        which: usize,
        exec: impl FnMut(&CellInds, &SimulationState, &mut Lattice, &mut [CellsToChange])
        + Send
        + 'static,
        cno_vec: Vec<CellNeighOffsets>,
    ) -> Result<(), EngineError> {
        *self.slot(which)? = Some(EventExecutor::SemiManualTrack {
            exec: Box::new(exec),
            cno_vec,
        });
        Ok(())
    }

    pub fn executor_type(&self, which: usize) -> Option<EventExecutorType> {
        self.executors
            .get(which)?
            .as_ref()
            .map(EventExecutor::executor_type)
    }

    /// Hands the executors over, failing if any slot was never filled.
    pub(crate) fn into_executors(self) -> Result<Vec<EventExecutor>, EngineError> {
        self.executors
            .into_iter()
            .enumerate()
            .map(|(which, exec)| {
                exec.ok_or_else(|| {
                    EngineError::InvalidOperation(format!(
                        "No executor was added for event index {which} of the group."
                    ))
                })
            })
            .collect()
    }
}
