use super::config::{SolverId, TimeIncrSchemeVars};
use super::error::EngineError;
use super::event_id::{EventId, EventIdLayout};
use super::executor::{
    CellCenteredGroupPropensities, EventExecutor, EventExecutorAutoTrack,
    EventExecutorGroup, EventExecutorSemiManualTrack,
};
use super::periodic::{Period, ScheduledAction};
use super::registry::IdRegistry;
use super::solver::{Solver, mk_solver};
use super::state::SimulationState;
use crate::core::cell::{CellInds, CellIndsOffset};
use crate::core::cells_to_change::CellsToChange;
use crate::core::lattice::{Lattice, LatticeParams, LatticePlanarBBox, TrackType};
use crate::core::neighbors::{CellNeighOffsets, CellNeighProbe};
use crate::core::rng::{RandNumGenSharedPtr, lock_rng};
use itertools::iproduct;
use rayon::prelude::*;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, instrument, warn};

struct CellCenteredGroup {
    cio: Vec<CellIndsOffset>,
    propensities: CellCenteredGroupPropensities,
    event_slots: Vec<usize>,
}

impl CellCenteredGroup {
    fn evaluate(&self, lattice: &Lattice, ci: CellInds, out: &mut Vec<f64>) {
        out.clear();
        out.resize(self.event_slots.len(), 0.0);
        let probe = CellNeighProbe::new(lattice, ci, &self.cio);
        (self.propensities)(&probe, out);
    }
}

enum EventSlot {
    AutoTrack(EventExecutorAutoTrack),
    SemiManual {
        exec: EventExecutorSemiManualTrack,
        ctc_vec: Vec<CellsToChange>,
        /// Per entry of `ctc_vec`, offsets from its center whose events may
        /// depend on the cells it changes.
        affected: Vec<Vec<CellIndsOffset>>,
    },
}

impl From<EventExecutor> for EventSlot {
    fn from(exec: EventExecutor) -> Self {
        match exec {
            EventExecutor::AutoTrack(exec) => EventSlot::AutoTrack(exec),
            EventExecutor::SemiManualTrack { exec, cno_vec } => EventSlot::SemiManual {
                exec,
                ctc_vec: cno_vec
                    .iter()
                    .map(|cno| CellsToChange::from_offsets(cno.offsets()))
                    .collect(),
                affected: Vec::new(),
            },
        }
    }
}

struct OverLatticeEvent {
    propensity: f64,
    exec: EventSlot,
}

/// Re-evaluates the propensities of single cells after the lattice changed.
struct PropensityRefresh<'a> {
    groups: &'a [CellCenteredGroup],
    lattice: &'a Lattice,
    layout: &'a EventIdLayout,
    solver: &'a mut dyn Solver,
    scratch: Vec<f64>,
}

impl<'a> PropensityRefresh<'a> {
    fn new(
        groups: &'a [CellCenteredGroup],
        lattice: &'a Lattice,
        layout: &'a EventIdLayout,
        solver: &'a mut dyn Solver,
    ) -> Self {
        Self {
            groups,
            lattice,
            layout,
            solver,
            scratch: Vec::new(),
        }
    }

    fn update_cell(&mut self, mut ci: CellInds) {
        self.lattice.wrap_inds_if_needed(&mut ci);
        if ci.k < 0 || ci.k >= self.lattice.curr_height() {
            return;
        }
        for group in self.groups {
            group.evaluate(self.lattice, ci, &mut self.scratch);
            for (&slot, &p) in group.event_slots.iter().zip(&self.scratch) {
                self.solver
                    .add_or_update_cell_centered_entry(self.layout.cell_centered(&ci, slot), p);
            }
        }
    }

    fn update_recorded(
        &mut self,
        changed: &BTreeSet<CellInds>,
        reversed_offsets: &[CellIndsOffset],
        other: &[CellInds],
    ) {
        for &ci in changed {
            self.update_cell(ci);
            for &rev in reversed_offsets {
                self.update_cell(ci + rev);
            }
        }
        for &ci in other {
            self.update_cell(ci);
        }
    }
}

fn missing_solver() -> EngineError {
    EngineError::Internal("no solver is set".to_string())
}

/// Serial kinetic Monte Carlo driver.
///
/// Owns the lattice, the registered events and periodic actions, the solver
/// and the random number generator. Each call to [`Simulation::run`] rebuilds
/// the event list from scratch and then executes events until the clock passes
/// the accumulated run time.
pub struct Simulation {
    lattice: Lattice,
    state: SimulationState,

    groups: IdRegistry<CellCenteredGroup>,
    cell_cen_events: Vec<Option<EventSlot>>,
    free_event_slots: VecDeque<usize>,
    over_lattice: IdRegistry<OverLatticeEvent>,

    time_actions: IdRegistry<ScheduledAction>,
    step_actions: IdRegistry<ScheduledAction>,
    track_periodic_changes: bool,

    solver: Option<Box<dyn Solver>>,
    rng: Option<RandNumGenSharedPtr>,

    layout: EventIdLayout,
    reversed_offsets: Vec<CellIndsOffset>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("lattice", &self.lattice)
            .field("state", &self.state)
            .field("num_event_groups", &self.groups.len())
            .field("num_over_lattice_events", &self.over_lattice.len())
            .field("has_solver", &self.solver.is_some())
            .field("has_rng", &self.rng.is_some())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// # Errors
    ///
    /// Returns an error if the lattice parameters are invalid.
    pub fn new(params: LatticeParams) -> Result<Self, EngineError> {
        Ok(Self {
            lattice: Lattice::new(params)?,
            state: SimulationState::default(),
            groups: IdRegistry::new("eventGroupId"),
            cell_cen_events: Vec::new(),
            free_event_slots: VecDeque::new(),
            over_lattice: IdRegistry::new("eventId"),
            time_actions: IdRegistry::new("actionId"),
            step_actions: IdRegistry::new("actionId"),
            track_periodic_changes: false,
            solver: None,
            rng: None,
            layout: EventIdLayout::default(),
            reversed_offsets: Vec::new(),
        })
    }

    /// Replaces the solver. The random number generator has to be set again
    /// afterwards.
    pub fn set_solver(&mut self, id: SolverId) {
        debug!(solver = %id, "Solver set");
        self.solver = Some(mk_solver(id));
        self.rng = None;
    }

    /// # Errors
    ///
    /// Returns an error if no solver has been set yet.
    pub fn set_rng(&mut self, rng: RandNumGenSharedPtr) -> Result<(), EngineError> {
        if self.solver.is_none() {
            return Err(EngineError::InvalidOperation(
                "Random number generator must be set after the solver has been set".to_string(),
            ));
        }
        self.rng = Some(rng);
        Ok(())
    }

    /// Time-increment schemes only affect parallel runs.
    pub fn set_time_incr_scheme(&mut self, _vars: &TimeIncrSchemeVars) {
        warn!("using set_time_incr_scheme with the serial version does nothing");
    }

    /// When enabled, cells written by periodic actions are recorded and only
    /// their events are refreshed. Otherwise any change made by a periodic
    /// action rebuilds the whole event list.
    pub fn track_cells_changed_by_periodic_actions(&mut self, track: bool) {
        self.track_periodic_changes = track;
    }

    pub fn reserve_cell_centered_event_groups(&mut self, num_groups: usize, num_events: usize) {
        self.groups.reserve(num_groups);
        self.cell_cen_events.reserve(num_events);
    }

    pub fn reserve_over_lattice_events(&mut self, num_events: usize) {
        self.over_lattice.reserve(num_events);
    }

    pub fn reserve_time_periodic_actions(&mut self, num_actions: usize) {
        self.time_actions.reserve(num_actions);
    }

    pub fn reserve_step_periodic_actions(&mut self, num_actions: usize) {
        self.step_actions.reserve(num_actions);
    }

    // --- Cell-centered events ---

    /// Registers a group of events whose propensities are computed together
    /// from the cells at `cno`'s offsets around each lattice cell.
    ///
    /// # Errors
    ///
    /// Returns an error if `group_id` is taken or a slot of `group` has no
    /// executor.
    pub fn add_cell_centered_event_group(
        &mut self,
        group_id: i32,
        cno: CellNeighOffsets,
        propensities: impl Fn(&CellNeighProbe<'_>, &mut [f64]) + Send + Sync + 'static,
        group: EventExecutorGroup,
    ) -> Result<(), EngineError> {
        self.insert_group(
            group_id,
            cno,
            Box::new(propensities),
            group,
            "addCellCenteredEventGroup",
        )
    }

    /// # Errors
    ///
    /// Returns an error if `group_id` does not exist.
    pub fn change_cell_centered_event_group(
        &mut self,
        group_id: i32,
        cno: CellNeighOffsets,
        propensities: impl Fn(&CellNeighProbe<'_>, &mut [f64]) + Send + Sync + 'static,
        group: EventExecutorGroup,
    ) -> Result<(), EngineError> {
        let caller = "changeCellCenteredEventGroup";
        let executors = group.into_executors()?;
        self.take_group(group_id, caller)?;
        self.insert_executors(group_id, cno, Box::new(propensities), executors, caller)
    }

    /// # Errors
    ///
    /// Returns an error if `group_id` does not exist.
    pub fn remove_cell_centered_event_group(&mut self, group_id: i32) -> Result<(), EngineError> {
        self.take_group(group_id, "removeCellCenteredEventGroup")
    }

    fn insert_group(
        &mut self,
        group_id: i32,
        cno: CellNeighOffsets,
        propensities: CellCenteredGroupPropensities,
        group: EventExecutorGroup,
        caller: &str,
    ) -> Result<(), EngineError> {
        if self.groups.index(group_id, caller).is_ok() {
            return Err(EngineError::InvalidOperation(format!(
                "{caller} error: eventGroupId {group_id} already exists."
            )));
        }
        let executors = group.into_executors()?;
        self.insert_executors(group_id, cno, propensities, executors, caller)
    }

    fn insert_executors(
        &mut self,
        group_id: i32,
        cno: CellNeighOffsets,
        propensities: CellCenteredGroupPropensities,
        executors: Vec<EventExecutor>,
        caller: &str,
    ) -> Result<(), EngineError> {
        let event_slots = executors
            .into_iter()
            .map(|exec| {
                let slot = Some(EventSlot::from(exec));
                match self.free_event_slots.pop_front() {
                    Some(free) => {
                        self.cell_cen_events[free] = slot;
                        free
                    }
                    None => {
                        self.cell_cen_events.push(slot);
                        self.cell_cen_events.len() - 1
                    }
                }
            })
            .collect();

        self.groups.insert(
            group_id,
            CellCenteredGroup {
                cio: cno.offsets().to_vec(),
                propensities,
                event_slots,
            },
            caller,
        )?;
        Ok(())
    }

    fn take_group(&mut self, group_id: i32, caller: &str) -> Result<(), EngineError> {
        let group = self.groups.remove(group_id, caller)?;
        for slot in group.event_slots {
            self.cell_cen_events[slot] = None;
            self.free_event_slots.push_back(slot);
        }
        Ok(())
    }

    // --- Over-lattice events ---

    fn over_lattice_event(&self, propensity_per_unit_area: f64, exec: EventSlot) -> OverLatticeEvent {
        OverLatticeEvent {
            propensity: propensity_per_unit_area * self.lattice.sector_planar_bbox(0).area(),
            exec,
        }
    }

    /// Registers an event that happens anywhere on the top of the lattice at
    /// a rate proportional to its planar area.
    ///
    /// # Errors
    ///
    /// Returns an error if `event_id` is taken.
    pub fn add_over_lattice_event(
        &mut self,
        event_id: i32,
        propensity_per_unit_area: f64,
        exec: impl FnMut(&CellInds, &SimulationState, &mut Lattice) + Send + 'static,
    ) -> Result<(), EngineError> {
        let event = self.over_lattice_event(
            propensity_per_unit_area,
            EventSlot::AutoTrack(Box::new(exec)),
        );
        self.over_lattice
            .insert(event_id, event, "addOverLatticeEvent")?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `event_id` is taken.
    pub fn add_over_lattice_event_semi_manual(
        &mut self,
        event_id: i32,
        propensity_per_unit_area: f64,
        exec: impl FnMut(&CellInds, &SimulationState, &mut Lattice, &mut [CellsToChange])
        + Send
        + 'static,
        cno_vec: Vec<CellNeighOffsets>,
    ) -> Result<(), EngineError> {
        let slot = EventExecutor::SemiManualTrack {
            exec: Box::new(exec),
            cno_vec,
        };
        let event = self.over_lattice_event(propensity_per_unit_area, slot.into());
        self.over_lattice
            .insert(event_id, event, "addOverLatticeEvent")?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `event_id` does not exist.
    pub fn change_over_lattice_event(
        &mut self,
        event_id: i32,
        propensity_per_unit_area: f64,
        exec: impl FnMut(&CellInds, &SimulationState, &mut Lattice) + Send + 'static,
    ) -> Result<(), EngineError> {
        let event = self.over_lattice_event(
            propensity_per_unit_area,
            EventSlot::AutoTrack(Box::new(exec)),
        );
        *self
            .over_lattice
            .get_mut(event_id, "changeOverLatticeEvent")? = event;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `event_id` does not exist.
    pub fn change_over_lattice_event_semi_manual(
        &mut self,
        event_id: i32,
        propensity_per_unit_area: f64,
        exec: impl FnMut(&CellInds, &SimulationState, &mut Lattice, &mut [CellsToChange])
        + Send
        + 'static,
        cno_vec: Vec<CellNeighOffsets>,
    ) -> Result<(), EngineError> {
        let slot = EventExecutor::SemiManualTrack {
            exec: Box::new(exec),
            cno_vec,
        };
        let event = self.over_lattice_event(propensity_per_unit_area, slot.into());
        *self
            .over_lattice
            .get_mut(event_id, "changeOverLatticeEvent")? = event;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `event_id` does not exist.
    pub fn remove_over_lattice_event(&mut self, event_id: i32) -> Result<(), EngineError> {
        self.over_lattice
            .remove(event_id, "removeOverLatticeEvent")?;
        Ok(())
    }

    // --- Periodic actions ---

    /// Runs `action` each time the clock passes another multiple of `period`,
    /// and once more at the end of a run if `do_at_sim_end` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if `action_id` is taken.
    pub fn add_time_periodic_action(
        &mut self,
        action_id: i32,
        action: impl FnMut(&SimulationState, &mut Lattice) + Send + 'static,
        period: f64,
        do_at_sim_end: bool,
    ) -> Result<(), EngineError> {
        let action = ScheduledAction::new(Box::new(action), Period::Time(period), do_at_sim_end);
        self.time_actions
            .insert(action_id, action, "addTimePeriodicAction")?;
        Ok(())
    }

    /// Replaces an action; the replacement's schedule starts over.
    ///
    /// # Errors
    ///
    /// Returns an error if `action_id` does not exist.
    pub fn change_time_periodic_action(
        &mut self,
        action_id: i32,
        action: impl FnMut(&SimulationState, &mut Lattice) + Send + 'static,
        period: f64,
        do_at_sim_end: bool,
    ) -> Result<(), EngineError> {
        *self
            .time_actions
            .get_mut(action_id, "changePeriodicAction")? =
            ScheduledAction::new(Box::new(action), Period::Time(period), do_at_sim_end);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `action_id` does not exist.
    pub fn remove_time_periodic_action(&mut self, action_id: i32) -> Result<(), EngineError> {
        self.time_actions
            .remove(action_id, "removeTimePeriodicAction")?;
        Ok(())
    }

    /// Runs `action` every `period` executed steps, and once more at the end
    /// of a run if `do_at_sim_end` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if `action_id` is taken.
    pub fn add_step_periodic_action(
        &mut self,
        action_id: i32,
        action: impl FnMut(&SimulationState, &mut Lattice) + Send + 'static,
        period: u64,
        do_at_sim_end: bool,
    ) -> Result<(), EngineError> {
        let action = ScheduledAction::new(Box::new(action), Period::Steps(period), do_at_sim_end);
        self.step_actions
            .insert(action_id, action, "addStepPeriodicAction")?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `action_id` does not exist.
    pub fn change_step_periodic_action(
        &mut self,
        action_id: i32,
        action: impl FnMut(&SimulationState, &mut Lattice) + Send + 'static,
        period: u64,
        do_at_sim_end: bool,
    ) -> Result<(), EngineError> {
        *self
            .step_actions
            .get_mut(action_id, "changeStepPeriodicAction")? =
            ScheduledAction::new(Box::new(action), Period::Steps(period), do_at_sim_end);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `action_id` does not exist.
    pub fn remove_step_periodic_action(&mut self, action_id: i32) -> Result<(), EngineError> {
        self.step_actions
            .remove(action_id, "removeStepPeriodicAction")?;
        Ok(())
    }

    // --- Accessors ---

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn elapsed_time(&self) -> f64 {
        self.state.elapsed_time
    }

    pub fn num_local_events(&self) -> u64 {
        self.state.num_local_events
    }

    pub fn num_global_steps(&self) -> u64 {
        self.state.num_global_steps
    }

    pub fn n_procs(&self) -> i32 {
        self.lattice.n_procs()
    }

    pub fn proc_id(&self) -> i32 {
        self.lattice.proc_id()
    }

    pub fn proc_per_dim(&self, dim: usize) -> i32 {
        self.lattice.proc_per_dim(dim)
    }

    pub fn comm_coord(&self, dim: usize) -> i32 {
        self.lattice.comm_coord(dim)
    }

    pub fn lattice_local_planar_bbox(&self, with_ghost: bool) -> LatticePlanarBBox {
        self.lattice.local_planar_bbox(with_ghost)
    }

    pub fn lattice_sector_planar_bbox(&self, sector: usize) -> LatticePlanarBBox {
        self.lattice.sector_planar_bbox(sector)
    }

    pub fn lattice_global_planar_bbox(&self) -> LatticePlanarBBox {
        self.lattice.global_planar_bbox()
    }

    // --- Running ---

    fn check_ready(&self) -> Result<(), EngineError> {
        let mut problems = Vec::new();
        if self.solver.is_none() {
            problems.push("Must set solver before running simulation.");
        }
        if self.rng.is_none() {
            problems.push("Must set RNG before running simulation.");
        }
        if self.groups.is_empty() && self.over_lattice.is_empty() {
            problems.push("Must add events to simulation before running it.");
        }
        if self.lattice.curr_height() < 1 {
            problems.push("Lattice must have at least one (possibly empty) plane.");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidOperation(problems.join("\n")))
        }
    }

    /// Advances the simulation clock by `run_time`, executing events until it
    /// is reached or no event remains possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the solver, the random number generator, any event
    /// or the first lattice plane is missing.
    #[instrument(skip(self), name = "kmc_run")]
    pub fn run(&mut self, run_time: f64) -> Result<(), EngineError> {
        self.check_ready()?;
        self.state.max_time += run_time;

        self.prepare_offsets();
        self.layout = EventIdLayout::new(
            &self.lattice.local_planar_bbox(false),
            self.cell_cen_events.len(),
        );
        self.rebuild_event_list()?;

        info!(
            start = self.state.elapsed_time,
            stop = self.state.max_time,
            "Running simulation"
        );

        while self.state.elapsed_time < self.state.max_time {
            let solver = self.solver.as_deref_mut().ok_or_else(missing_solver)?;
            if solver.no_more_events() {
                info!(
                    "Simulation ran out of events to execute at simulation time = {}",
                    self.state.elapsed_time
                );
                break;
            }
            let rng = self
                .rng
                .as_ref()
                .ok_or_else(|| EngineError::Internal("no RNG is set".to_string()))?;
            let eid = {
                let mut rng = lock_rng(rng);
                solver.choose_event_id_and_update_time(&mut *rng, &mut self.state.elapsed_time)?
            };
            self.execute_event(eid)?;
            self.state.num_global_steps += 1;
            self.run_periodic_actions()?;
        }

        debug!(
            elapsed = self.state.elapsed_time,
            events = self.state.num_local_events,
            "Run finished"
        );
        Ok(())
    }

    fn prepare_offsets(&mut self) {
        let reversed: BTreeSet<CellIndsOffset> = self
            .groups
            .items()
            .iter()
            .flat_map(|g| g.cio.iter().skip(1).map(|&off| -off))
            .collect();
        self.reversed_offsets = reversed.into_iter().collect();

        let reversed = &self.reversed_offsets;
        let slots = self
            .cell_cen_events
            .iter_mut()
            .flatten()
            .chain(self.over_lattice.items_mut().iter_mut().map(|e| &mut e.exec));
        for slot in slots {
            if let EventSlot::SemiManual {
                ctc_vec, affected, ..
            } = slot
            {
                *affected = ctc_vec
                    .iter()
                    .map(|ctc| {
                        iproduct!(reversed.iter(), ctc.offsets().iter())
                            .map(|(&rev, &off)| rev + off)
                            .collect::<BTreeSet<_>>()
                            .into_iter()
                            .collect()
                    })
                    .collect();
            }
        }
    }

    fn rebuild_event_list(&mut self) -> Result<(), EngineError> {
        let solver = self.solver.as_deref_mut().ok_or_else(missing_solver)?;
        solver.begin_building_event_list(
            &self.layout,
            self.over_lattice.len(),
            self.lattice.planes_reserved(),
        );

        let groups = self.groups.items();
        let lattice = &self.lattice;
        let layout = &self.layout;
        let bbox = lattice.local_planar_bbox(false);
        let columns: Vec<(i32, i32)> =
            iproduct!(bbox.imin..bbox.imax_p1, bbox.jmin..bbox.jmax_p1).collect();

        for k in 0..lattice.curr_height() {
            let plane_entries: Vec<Vec<(EventId, f64)>> = columns
                .par_iter()
                .map(|&(i, j)| {
                    let ci = CellInds::new(i, j, k);
                    let mut scratch = Vec::new();
                    let mut entries = Vec::new();
                    for group in groups {
                        group.evaluate(lattice, ci, &mut scratch);
                        entries.extend(
                            group
                                .event_slots
                                .iter()
                                .zip(&scratch)
                                .filter(|&(_, &p)| p > 0.0)
                                .map(|(&slot, &p)| (layout.cell_centered(&ci, slot), p)),
                        );
                    }
                    entries
                })
                .collect();
            for (eid, p) in plane_entries.into_iter().flatten() {
                solver.add_cell_centered_entry(eid, p);
            }
        }

        for (index, event) in self.over_lattice.items().iter().enumerate() {
            if event.propensity > 0.0 {
                solver.add_over_lattice_entry(EventId::over_lattice(index, 0), event.propensity);
            }
        }
        solver.end_building_event_list();

        debug!(
            num_events = solver.num_events(),
            total_propensity = solver.total_propensity(),
            "Event list rebuilt"
        );
        Ok(())
    }

    /// A uniformly random cell of the top plane.
    fn random_top_cell(&self) -> Result<CellInds, EngineError> {
        let rng = self
            .rng
            .as_ref()
            .ok_or_else(|| EngineError::Internal("no RNG is set".to_string()))?;
        let mut rng = lock_rng(rng);
        let bbox = self.lattice.sector_planar_bbox(0);
        let i = bbox.imin
            + (f64::from(bbox.i_extent()) * rng.get_num_in_open_interval_from_0_to_1()) as i32;
        let j = bbox.jmin
            + (f64::from(bbox.j_extent()) * rng.get_num_in_open_interval_from_0_to_1()) as i32;
        Ok(CellInds::new(
            i.min(bbox.imax_p1 - 1),
            j.min(bbox.jmax_p1 - 1),
            self.lattice.curr_height() - 1,
        ))
    }

    fn execute_event(&mut self, eid: EventId) -> Result<(), EngineError> {
        self.state.num_local_events += 1;

        let (ci, slot) = if eid.is_for_over_lattice() {
            let ci = self.random_top_cell()?;
            let slot = self
                .over_lattice
                .items_mut()
                .get_mut(eid.over_lattice_index())
                .map(|e| &mut e.exec);
            (ci, slot)
        } else {
            let (ci, index) = self.layout.decode(&eid);
            (ci, self.cell_cen_events.get_mut(index).and_then(Option::as_mut))
        };
        let layout = &self.layout;
        let slot = slot.ok_or_else(|| {
            EngineError::Internal(format!("no executor for {}", eid.describe(layout)))
        })?;

        match slot {
            EventSlot::AutoTrack(exec) => {
                self.lattice
                    .track_changes(TrackType::RecordChangedCellInds);
                exec(&ci, &self.state, &mut self.lattice);
                self.refresh_recorded_changes()?;
            }
            EventSlot::SemiManual {
                exec,
                ctc_vec,
                affected,
            } => {
                self.lattice
                    .track_changes(TrackType::RecordOnlyOtherChangedCellInds);
                ctc_vec.iter_mut().for_each(CellsToChange::reset_center);
                exec(&ci, &self.state, &mut self.lattice, &mut ctc_vec[..]);

                let (_, other) = self.lattice.take_recorded_changes();
                let solver = self.solver.as_deref_mut().ok_or_else(missing_solver)?;
                let mut refresh =
                    PropensityRefresh::new(self.groups.items(), &self.lattice, &self.layout, solver);
                for (n, (ctc, offsets)) in ctc_vec.iter().zip(affected.iter()).enumerate() {
                    if !ctc.has_center() {
                        warn!(
                            event = %eid.describe(layout),
                            cells_to_change = n,
                            "Executor did not set a center; its declared cells are not refreshed."
                        );
                        continue;
                    }
                    for &cell in ctc.cell_inds() {
                        refresh.update_cell(cell);
                    }
                    let center = *ctc.center();
                    for &off in offsets {
                        refresh.update_cell(center + off);
                    }
                }
                for &cell in &other {
                    refresh.update_cell(cell);
                }
            }
        }

        self.lattice.track_changes(TrackType::None);
        Ok(())
    }

    /// Refreshes the events around every cell the lattice recorded as changed.
    fn refresh_recorded_changes(&mut self) -> Result<(), EngineError> {
        let (changed, other) = self.lattice.take_recorded_changes();
        let solver = self.solver.as_deref_mut().ok_or_else(missing_solver)?;
        PropensityRefresh::new(self.groups.items(), &self.lattice, &self.layout, solver)
            .update_recorded(&changed, &self.reversed_offsets, &other);
        Ok(())
    }

    fn run_periodic_actions(&mut self) -> Result<(), EngineError> {
        if self.time_actions.is_empty() && self.step_actions.is_empty() {
            return Ok(());
        }

        self.lattice.track_changes(if self.track_periodic_changes {
            TrackType::RecordChangedCellInds
        } else {
            TrackType::CheckOnlyIfChangeOccurs
        });

        for action in self.time_actions.items_mut() {
            action.run_if_due(&self.state, &mut self.lattice);
        }
        for action in self.step_actions.items_mut() {
            action.run_if_due(&self.state, &mut self.lattice);
        }

        if self.lattice.has_changed() {
            if self.track_periodic_changes {
                self.refresh_recorded_changes()?;
            } else {
                self.rebuild_event_list()?;
            }
        }

        self.lattice.track_changes(TrackType::None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::{RngKind, mk_rng};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    const FILLED: usize = 0;

    fn chain_params(len: i32) -> LatticeParams {
        LatticeParams::new()
            .global_planar_dims(len, 1)
            .num_ints_per_cell(1)
    }

    fn ready_simulation(params: LatticeParams, solver: SolverId, seed: u64) -> Simulation {
        let mut sim = Simulation::new(params).unwrap();
        sim.set_solver(solver);
        sim.set_rng(mk_rng(RngKind::Standard, seed, 0)).unwrap();
        sim
    }

    /// Cell `i` may only fill once cell `i + 1` is filled; the last cell
    /// fills unconditionally. Exercises refreshing of dependent cells.
    fn domino_propensities(len: i32) -> impl Fn(&CellNeighProbe<'_>, &mut [f64]) + Send + Sync {
        move |probe: &CellNeighProbe<'_>, out: &mut [f64]| {
            let me = probe.get_cell_to_probe(0);
            let next = probe.get_cell_to_probe(1);
            if probe.get_int(&me, FILLED) == 0
                && (probe.center().i == len - 1 || probe.get_int(&next, FILLED) == 1)
            {
                out[0] = 1.0;
            }
        }
    }

    fn domino_offsets() -> CellNeighOffsets {
        CellNeighOffsets::new(2)
            .unwrap()
            .with_offset(1, CellIndsOffset::planar(1, 0))
            .unwrap()
    }

    fn filled_cells(sim: &Simulation, len: i32) -> Vec<i32> {
        (0..len)
            .map(|i| sim.lattice().get_int(&CellInds::new(i, 0, 0), FILLED))
            .collect()
    }

    #[test]
    fn run_reports_every_missing_prerequisite() {
        let mut sim = Simulation::new(chain_params(2)).unwrap();
        let msg = sim.run(1.0).unwrap_err().to_string();
        assert!(msg.contains("Must set solver before running simulation."));
        assert!(msg.contains("Must set RNG before running simulation."));
        assert!(msg.contains("Must add events to simulation before running it."));
        assert!(!msg.contains("Lattice must have"));
    }

    #[test]
    fn rng_requires_solver_and_is_cleared_by_new_solver() {
        let mut sim = Simulation::new(chain_params(2)).unwrap();
        let err = sim.set_rng(mk_rng(RngKind::Standard, 1, 0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Random number generator must be set after the solver has been set"
        );

        sim.set_solver(SolverId::BinaryTree);
        sim.set_rng(mk_rng(RngKind::Standard, 1, 0)).unwrap();
        sim.set_solver(SolverId::DynamicSchulze);
        sim.add_over_lattice_event(0, 1.0, |_: &CellInds, _: &SimulationState, _: &mut Lattice| {})
            .unwrap();
        let msg = sim.run(1.0).unwrap_err().to_string();
        assert_eq!(msg, "Must set RNG before running simulation.");
    }

    #[test]
    fn unknown_ids_name_the_calling_operation() {
        let mut sim = Simulation::new(chain_params(2)).unwrap();
        assert_eq!(
            sim.remove_cell_centered_event_group(3).unwrap_err().to_string(),
            "removeCellCenteredEventGroup error: eventGroupId 3 does not exist."
        );
        assert_eq!(
            sim.remove_over_lattice_event(4).unwrap_err().to_string(),
            "removeOverLatticeEvent error: eventId 4 does not exist."
        );
        let err = sim
            .change_time_periodic_action(5, |_: &SimulationState, _: &mut Lattice| {}, 1.0, false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "changePeriodicAction error: actionId 5 does not exist."
        );
        let err = sim
            .change_step_periodic_action(6, |_: &SimulationState, _: &mut Lattice| {}, 1, false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "changeStepPeriodicAction error: actionId 6 does not exist."
        );
    }

    fn noop_group(num_events: usize) -> EventExecutorGroup {
        let mut group = EventExecutorGroup::new(num_events);
        for n in 0..num_events {
            group
                .add_event_executor(n, |_: &CellInds, _: &SimulationState, _: &mut Lattice| {})
                .unwrap();
        }
        group
    }

    fn no_propensity(_: &CellNeighProbe<'_>, _: &mut [f64]) {}

    #[test]
    fn removed_group_slots_are_reused_first_in_first_out() {
        let mut sim = Simulation::new(chain_params(2)).unwrap();
        let cno = CellNeighOffsets::default;
        sim.add_cell_centered_event_group(1, cno(), no_propensity, noop_group(2))
            .unwrap();
        sim.add_cell_centered_event_group(2, cno(), no_propensity, noop_group(1))
            .unwrap();
        sim.remove_cell_centered_event_group(1).unwrap();
        sim.add_cell_centered_event_group(3, cno(), no_propensity, noop_group(3))
            .unwrap();

        let slots = &sim.groups.items()[sim.groups.index(3, "test").unwrap()].event_slots;
        assert_eq!(slots, &[0, 1, 3]);
        assert_eq!(sim.cell_cen_events.len(), 4);
        assert!(
            sim.add_cell_centered_event_group(2, cno(), no_propensity, noop_group(1))
                .is_err()
        );
    }

    fn run_domino(solver: SolverId, semi_manual: bool) -> Simulation {
        let len = 6;
        let mut sim = ready_simulation(chain_params(len), solver, 17);
        let mut group = EventExecutorGroup::new(1);
        if semi_manual {
            group
                .add_event_executor_semi_manual(
                    0,
                    |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice, ctc: &mut [CellsToChange]| {
                        ctc[0].set_center(ci);
                        ctc[0].set_int(lattice, 0, FILLED, 1);
                    },
                    vec![CellNeighOffsets::default()],
                )
                .unwrap();
        } else {
            group
                .add_event_executor(
                    0,
                    |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice| {
                        lattice.set_int(ci, FILLED, 1);
                    },
                )
                .unwrap();
        }
        sim.add_cell_centered_event_group(0, domino_offsets(), domino_propensities(len), group)
            .unwrap();
        sim.run(1.0e6).unwrap();
        sim
    }

    #[test]
    fn dependent_cells_are_refreshed_after_auto_tracked_events() {
        for solver in [SolverId::BinaryTree, SolverId::DynamicSchulze] {
            let sim = run_domino(solver, false);
            assert_eq!(filled_cells(&sim, 6), vec![1; 6]);
            assert_eq!(sim.num_local_events(), 6);
            assert_eq!(sim.num_global_steps(), 6);
            assert!(sim.elapsed_time() > 0.0 && sim.elapsed_time() < 1.0e6);
        }
    }

    #[test]
    fn dependent_cells_are_refreshed_after_semi_manual_events() {
        for solver in [SolverId::BinaryTree, SolverId::DynamicSchulze] {
            let sim = run_domino(solver, true);
            assert_eq!(filled_cells(&sim, 6), vec![1; 6]);
            assert_eq!(sim.num_local_events(), 6);
        }
    }

    #[test]
    fn centerless_cells_to_change_are_skipped_not_fatal() {
        let len = 4;
        let mut sim = ready_simulation(chain_params(len), SolverId::DynamicSchulze, 23);
        let mut group = EventExecutorGroup::new(1);
        group
            .add_event_executor_semi_manual(
                0,
                |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice, _: &mut [CellsToChange]| {
                    lattice.set_int(ci, FILLED, 1);
                },
                vec![CellNeighOffsets::default()],
            )
            .unwrap();
        sim.add_cell_centered_event_group(0, domino_offsets(), domino_propensities(len), group)
            .unwrap();

        sim.run(20.0).unwrap();

        // Nothing was refreshed, so only the last cell ever became possible
        // and it stays selectable after filling.
        assert_eq!(filled_cells(&sim, len), vec![0, 0, 0, 1]);
        assert!(sim.num_local_events() > 1);
        assert!(sim.elapsed_time() >= 20.0);
    }

    #[test]
    fn end_of_run_action_fires_once_when_period_does_not_divide_run() {
        let mut sim = ready_simulation(
            LatticeParams::new()
                .global_planar_dims(3, 3)
                .num_ints_per_cell(1),
            SolverId::BinaryTree,
            31,
        );
        sim.add_over_lattice_event(0, 10.0, |_: &CellInds, _: &SimulationState, _: &mut Lattice| {})
            .unwrap();

        let fired = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&fired);
        sim.add_time_periodic_action(
            0,
            move |state: &SimulationState, _: &mut Lattice| {
                log.lock().unwrap().push(state.elapsed_time());
            },
            0.3,
            true,
        )
        .unwrap();

        sim.run(1.0).unwrap();

        let times = fired.lock().unwrap().clone();
        let at_end: Vec<f64> = times.iter().copied().filter(|&t| t >= 1.0).collect();
        assert_eq!(at_end, vec![sim.elapsed_time()]);
        assert_eq!(times.last().copied(), Some(sim.elapsed_time()));
        // Periods at 0.3, 0.6 and 0.9 each fire before the run ends.
        assert_eq!(times.len(), 4);
        assert!(times[..3].iter().all(|&t| t < 1.0));
    }

    #[test]
    fn same_seed_reproduces_the_trajectory() {
        let a = run_domino(SolverId::BinaryTree, false);
        let b = run_domino(SolverId::BinaryTree, false);
        assert_eq!(a.elapsed_time(), b.elapsed_time());
    }

    #[test]
    fn over_lattice_deposition_grows_columns_and_fires_step_actions() {
        const HEIGHT: usize = 0;
        let mut sim = ready_simulation(
            LatticeParams::new()
                .global_planar_dims(3, 3)
                .num_ints_per_cell(1),
            SolverId::DynamicSchulze,
            5,
        );
        sim.add_over_lattice_event(0, 1.0, |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice| {
            let h = lattice.get_int(ci, HEIGHT);
            lattice.set_int(ci, HEIGHT, h + 1);
        })
        .unwrap();

        let steps_seen = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&steps_seen);
        sim.add_step_periodic_action(
            0,
            move |_: &SimulationState, _: &mut Lattice| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            1,
            false,
        )
        .unwrap();

        sim.run(5.0).unwrap();
        assert!(sim.elapsed_time() >= 5.0);

        let total: i64 = iproduct!(0..3, 0..3)
            .map(|(i, j)| i64::from(sim.lattice().get_int(&CellInds::new(i, j, 0), HEIGHT)))
            .sum();
        assert_eq!(total as u64, sim.num_local_events());
        assert_eq!(steps_seen.load(Ordering::SeqCst), sim.num_global_steps());
        // Nine unit-area cells deposit at a total rate of nine per unit time.
        assert!(sim.num_local_events() > 10);
    }

    fn run_with_marking_action(track: bool) -> Simulation {
        const STATE: usize = 0;
        let mut sim = ready_simulation(chain_params(3), SolverId::BinaryTree, 9);
        sim.track_cells_changed_by_periodic_actions(track);

        // Keeps the clock moving.
        sim.add_over_lattice_event(0, 1.0, |_: &CellInds, _: &SimulationState, _: &mut Lattice| {})
            .unwrap();

        let mut group = EventExecutorGroup::new(1);
        group
            .add_event_executor(0, |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice| {
                lattice.set_int(ci, STATE, 3);
            })
            .unwrap();
        sim.add_cell_centered_event_group(
            0,
            CellNeighOffsets::default(),
            |probe: &CellNeighProbe<'_>, out: &mut [f64]| {
                if probe.get_int(&probe.get_cell_to_probe(0), STATE) == 2 {
                    out[0] = 1.0e3;
                }
            },
            group,
        )
        .unwrap();

        sim.add_step_periodic_action(
            0,
            |_: &SimulationState, lattice: &mut Lattice| {
                let ci = CellInds::new(1, 0, 0);
                if lattice.get_int(&ci, STATE) == 0 {
                    lattice.set_int(&ci, STATE, 2);
                }
            },
            5,
            false,
        )
        .unwrap();

        sim.run(50.0).unwrap();
        sim
    }

    #[test]
    fn periodic_action_changes_reach_the_event_list() {
        for track in [false, true] {
            let sim = run_with_marking_action(track);
            assert_eq!(
                sim.lattice().get_int(&CellInds::new(1, 0, 0), 0),
                3,
                "tracking = {track}"
            );
            assert_eq!(sim.lattice().get_int(&CellInds::new(0, 0, 0), 0), 0);
        }
    }

    #[test]
    fn empty_event_list_stops_run_early() {
        let mut sim = ready_simulation(chain_params(2), SolverId::DynamicSchulze, 3);
        sim.add_cell_centered_event_group(0, CellNeighOffsets::default(), no_propensity, noop_group(1))
            .unwrap();
        sim.run(10.0).unwrap();
        assert_eq!(sim.elapsed_time(), 0.0);
        assert_eq!(sim.num_local_events(), 0);
        assert_eq!(sim.state().max_time(), 10.0);
    }

    #[test]
    fn over_lattice_propensity_scales_with_planar_area() {
        let mut sim = Simulation::new(
            LatticeParams::new()
                .global_planar_dims(4, 5)
                .num_ints_per_cell(1),
        )
        .unwrap();
        sim.add_over_lattice_event(2, 0.5, |_: &CellInds, _: &SimulationState, _: &mut Lattice| {})
            .unwrap();
        assert_eq!(sim.over_lattice.items()[0].propensity, 10.0);
        sim.change_over_lattice_event(2, 2.0, |_: &CellInds, _: &SimulationState, _: &mut Lattice| {})
            .unwrap();
        assert_eq!(sim.over_lattice.items()[0].propensity, 40.0);
    }
}
