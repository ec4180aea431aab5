use super::columns::{self, HOP_DIRECTIONS};
use super::{
    add_progress_action, add_snapshot_action, deposit_then_relax, finish_series,
    prepare_output_dir, prepare_simulation, write_summary,
};
use crate::core::cell::{CellInds, CellIndsOffset};
use crate::core::cells_to_change::CellsToChange;
use crate::core::io::height_map::HeightMapSnapshot;
use crate::core::io::series::SnapshotSeries;
use crate::core::lattice::{Lattice, LatticeParams};
use crate::core::neighbors::{CellNeighOffsets, CellNeighProbe};
use crate::core::rng::{RngKind, mk_rng};
use crate::engine::config::{FractalConfig, SolverId, TrackingMode};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::simulation::Simulation;
use crate::engine::state::SimulationState;
use crate::{id_enum, offset_enum};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

id_enum!(pub IntVal { HEIGHT });
offset_enum!(pub HopOffset {
    UP, DOWN, LEFT, RIGHT, RIGHT_UP, RIGHT_DOWN, LEFT_UP, LEFT_DOWN
});

id_enum!(CellCenteredEvents { HOP_UP, HOP_DOWN, HOP_LEFT, HOP_RIGHT });
id_enum!(OverLatticeEvents { DEPOSITION });
id_enum!(Actions { PRINT, PROGRESS });

const HOP_GROUP: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FractalSummary {
    pub seed: u64,
    pub solver: SolverId,
    pub rng: RngKind,
    pub tracking: TrackingMode,
    pub deposition_time: f64,
    pub elapsed_time: f64,
    pub num_events: u64,
    /// Atoms on the surface; hops conserve it, so it equals the number of
    /// depositions.
    pub deposited_atoms: i64,
    pub max_height: i32,
    pub snapshots: Vec<PathBuf>,
}

#[instrument(skip_all, name = "fractal_workflow")]
pub fn run(
    config: &FractalConfig,
    reporter: &ProgressReporter,
) -> Result<FractalSummary, EngineError> {
    // === Phase 0: Lattice and events ===
    reporter.report(Progress::PhaseStart { name: "Setup" });
    let run = &config.run;
    prepare_output_dir(&run.output_dir)?;

    let mut sim = Simulation::new(
        LatticeParams::new()
            .global_planar_dims(run.domain_size, run.domain_size)
            .num_ints_per_cell(IntVal::SIZE),
    )?;
    prepare_simulation(&mut sim, run, &mk_rng(run.rng, run.seed, 0))?;
    add_events(&mut sim, config)?;

    let deposition_time = run.deposition_time();
    let relax_time = config.relax_fraction * deposition_time;
    let snapshots = add_snapshot_action(
        &mut sim,
        Actions::PRINT as i32,
        run,
        SnapshotSeries::new(
            HeightMapSnapshot {
                height_int: IntVal::HEIGHT,
            },
            &run.output_dir,
            &run.file_root,
        ),
    )?;
    add_progress_action(
        &mut sim,
        Actions::PROGRESS as i32,
        deposition_time + relax_time,
        reporter,
    )?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Deposition and diffusion, then relaxation ===
    info!(
        flux = run.flux,
        d_over_f = config.d_over_f,
        deposition_time,
        tracking = %config.tracking,
        "Starting fractal island growth."
    );
    deposit_then_relax(
        &mut sim,
        reporter,
        OverLatticeEvents::DEPOSITION as i32,
        deposition_time,
        relax_time,
    )?;

    // === Phase 2: Results ===
    let heights = columns::column_heights(sim.lattice(), IntVal::HEIGHT);

    let summary = FractalSummary {
        seed: run.seed,
        solver: run.solver,
        rng: run.rng,
        tracking: config.tracking,
        deposition_time,
        elapsed_time: sim.elapsed_time(),
        num_events: sim.num_local_events(),
        deposited_atoms: heights.iter().map(|&h| i64::from(h)).sum(),
        max_height: heights.iter().copied().max().unwrap_or(0),
        snapshots: finish_series(&snapshots)?,
    };
    write_summary(&summary, &run.output_dir)?;
    info!(
        num_events = summary.num_events,
        deposited_atoms = summary.deposited_atoms,
        "Fractal island growth complete."
    );
    Ok(summary)
}

fn add_events(sim: &mut Simulation, config: &FractalConfig) -> Result<(), EngineError> {
    sim.reserve_over_lattice_events(OverLatticeEvents::SIZE);
    match config.tracking {
        TrackingMode::Auto => sim.add_over_lattice_event(
            OverLatticeEvents::DEPOSITION as i32,
            config.run.flux,
            |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice| {
                columns::deposit(ci, IntVal::HEIGHT, lattice);
            },
        )?,
        TrackingMode::SemiManual => sim.add_over_lattice_event_semi_manual(
            OverLatticeEvents::DEPOSITION as i32,
            config.run.flux,
            |ci: &CellInds,
             _: &SimulationState,
             lattice: &mut Lattice,
             ctc: &mut [CellsToChange]| {
                columns::deposit_declared(ci, IntVal::HEIGHT, lattice, ctc);
            },
            vec![CellNeighOffsets::new(1)?],
        )?,
    }

    let d = config.d_over_f * config.run.flux;
    sim.reserve_cell_centered_event_groups(1, CellCenteredEvents::SIZE);
    sim.add_cell_centered_event_group(
        HOP_GROUP,
        hop_offsets()?,
        move |probe: &CellNeighProbe<'_>, out: &mut [f64]| {
            if is_isolated_peak(probe) {
                out.fill(d);
            }
        },
        columns::hop_executors(IntVal::HEIGHT, config.tracking)?,
    )
}

fn hop_offsets() -> Result<CellNeighOffsets, EngineError> {
    Ok(CellNeighOffsets::new(HopOffset::SIZE)?
        .with_offset(HopOffset::UP, HOP_DIRECTIONS[CellCenteredEvents::HOP_UP])?
        .with_offset(HopOffset::DOWN, HOP_DIRECTIONS[CellCenteredEvents::HOP_DOWN])?
        .with_offset(HopOffset::LEFT, HOP_DIRECTIONS[CellCenteredEvents::HOP_LEFT])?
        .with_offset(HopOffset::RIGHT, HOP_DIRECTIONS[CellCenteredEvents::HOP_RIGHT])?
        .with_offset(HopOffset::RIGHT_UP, CellIndsOffset::planar(1, 1))?
        .with_offset(HopOffset::RIGHT_DOWN, CellIndsOffset::planar(1, -1))?
        .with_offset(HopOffset::LEFT_UP, CellIndsOffset::planar(-1, 1))?
        .with_offset(HopOffset::LEFT_DOWN, CellIndsOffset::planar(-1, -1))?)
}

/// A column can shed an atom only if it is taller than all eight neighbors.
fn is_isolated_peak(probe: &CellNeighProbe<'_>) -> bool {
    let height = |which| probe.get_int(&probe.get_cell_to_probe(which), IntVal::HEIGHT);
    let h = height(HopOffset::SELF);
    h > 0 && (HopOffset::UP..HopOffset::SIZE).all(|which| h > height(which))
}
