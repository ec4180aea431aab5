use super::executor::PeriodicAction;
use super::state::SimulationState;
use crate::core::lattice::Lattice;

/// What a periodic action's period is measured in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Period {
    Time(f64),
    Steps(u64),
}

/// A periodic action and the point at which it next fires.
pub(crate) struct ScheduledAction {
    action: PeriodicAction,
    period: Period,
    next: Period,
    do_at_sim_end: bool,
}

impl ScheduledAction {
    pub(crate) fn new(action: PeriodicAction, period: Period, do_at_sim_end: bool) -> Self {
        Self {
            action,
            period,
            next: period,
            do_at_sim_end,
        }
    }

    /// Runs the action if its period elapsed, or if the run is over and the
    /// action asked to be run at the end. Returns whether it ran.
    pub(crate) fn run_if_due(&mut self, state: &SimulationState, lattice: &mut Lattice) -> bool {
        let at_end = self.do_at_sim_end && state.elapsed_time() >= state.max_time();
        let due = match (&mut self.next, self.period) {
            (Period::Time(next), Period::Time(period)) => {
                let due = state.elapsed_time() >= *next || at_end;
                if due {
                    *next += period;
                }
                due
            }
            (Period::Steps(next), Period::Steps(period)) => {
                let due = state.num_global_steps() >= *next || at_end;
                if due {
                    *next += period;
                }
                due
            }
            _ => false,
        };
        if due {
            (self.action)(state, lattice);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lattice::LatticeParams;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lattice() -> Lattice {
        Lattice::new(
            LatticeParams::new()
                .global_planar_dims(1, 1)
                .num_ints_per_cell(1),
        )
        .unwrap()
    }

    fn counting(count: &Arc<AtomicUsize>) -> PeriodicAction {
        let count = Arc::clone(count);
        Box::new(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn time_action_fires_once_per_crossed_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut action = ScheduledAction::new(counting(&count), Period::Time(1.0), false);
        let mut lattice = lattice();
        let mut state = SimulationState {
            max_time: 10.0,
            ..Default::default()
        };

        for t in [0.5, 0.99, 1.0, 1.5, 2.7, 2.8] {
            state.elapsed_time = t;
            action.run_if_due(&state, &mut lattice);
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn end_of_run_triggers_action_when_requested() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut with_end = ScheduledAction::new(counting(&count), Period::Time(100.0), true);
        let mut without_end = ScheduledAction::new(counting(&count), Period::Time(100.0), false);
        let mut lattice = lattice();
        let state = SimulationState {
            elapsed_time: 5.0,
            max_time: 4.0,
            ..Default::default()
        };
        assert!(with_end.run_if_due(&state, &mut lattice));
        assert!(!without_end.run_if_due(&state, &mut lattice));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn step_action_counts_global_steps() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut action = ScheduledAction::new(counting(&count), Period::Steps(3), false);
        let mut lattice = lattice();
        let mut state = SimulationState {
            max_time: 1.0,
            ..Default::default()
        };
        for step in 1..=10 {
            state.num_global_steps = step;
            action.run_if_due(&state, &mut lattice);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
