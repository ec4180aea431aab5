/// Clock and counters of a running simulation, as seen by executors and
/// periodic actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationState {
    pub(crate) elapsed_time: f64,
    pub(crate) t_stop: f64,
    pub(crate) max_time: f64,
    pub(crate) num_local_events: u64,
    pub(crate) num_global_steps: u64,
}

impl SimulationState {
    /// Simulated (not wall-clock) time since the start of the first run.
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    /// Simulated time at which the current run stops.
    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    /// Amount by which a parallel simulation advances its global clock.
    /// Always zero in a serial simulation.
    pub fn global_time_increment(&self) -> f64 {
        self.t_stop
    }

    pub fn num_local_events(&self) -> u64 {
        self.num_local_events
    }

    /// Number of times the clock advanced. Equal to
    /// [`SimulationState::num_local_events`] in a serial simulation.
    pub fn num_global_steps(&self) -> u64 {
        self.num_global_steps
    }
}
