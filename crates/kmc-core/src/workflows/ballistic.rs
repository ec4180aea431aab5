use super::{
    add_progress_action, add_snapshot_action, finish_series, prepare_output_dir,
    prepare_simulation, write_summary,
};
use crate::core::cell::{CellInds, CellIndsOffset};
use crate::core::cells_to_change::CellsToChange;
use crate::core::io::point3d::Point3dSnapshot;
use crate::core::io::series::SnapshotSeries;
use crate::core::lattice::{Lattice, LatticeParams};
use crate::core::neighbors::{CellNeighOffsets, CellNeighProbe};
use crate::core::rng::{RandNumGenSharedPtr, RngKind, lock_rng, mk_rng};
use crate::engine::config::{BallisticConfig, SolverId, TrackingMode};
use crate::engine::error::EngineError;
use crate::engine::executor::EventExecutorGroup;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::simulation::Simulation;
use crate::engine::state::SimulationState;
use crate::{id_enum, offset_enum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, instrument};

id_enum!(pub IntVal { IS_OCCUPIED, ACTIVE_ZONE_HEIGHT });
id_enum!(pub FloatVal { COLOR });
offset_enum!(pub MixOffset { NORTH, SOUTH, WEST, EAST, UP, DOWN });

id_enum!(CellCenteredEvents { COLOR_MIXING });
id_enum!(OverLatticeEvents { DEPOSITION });
id_enum!(Actions { PRINT, PROGRESS });

const MIX_GROUP: i32 = 1;

/// In-plane neighbors whose active zone a deposited atom can raise.
const LATERAL: [CellIndsOffset; 4] = [
    CellIndsOffset::planar(0, -1),
    CellIndsOffset::planar(0, 1),
    CellIndsOffset::planar(-1, 0),
    CellIndsOffset::planar(1, 0),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BallisticSummary {
    pub seed: u64,
    pub solver: SolverId,
    pub rng: RngKind,
    pub tracking: TrackingMode,
    pub elapsed_time: f64,
    pub num_events: u64,
    pub num_mixes: u64,
    pub film_height: i32,
    pub snapshots: Vec<PathBuf>,
}

#[instrument(skip_all, name = "ballistic_workflow")]
pub fn run(
    config: &BallisticConfig,
    reporter: &ProgressReporter,
) -> Result<BallisticSummary, EngineError> {
    // === Phase 0: Lattice and events ===
    reporter.report(Progress::PhaseStart { name: "Setup" });
    let run = &config.run;
    prepare_output_dir(&run.output_dir)?;

    // Empty cells draw their color from the same stream as the solver.
    let rng = mk_rng(run.rng, run.seed, 0);
    let color_rng = Arc::clone(&rng);
    let params = LatticeParams::new()
        .global_planar_dims(run.domain_size, run.domain_size)
        .num_ints_per_cell(IntVal::SIZE)
        .num_floats_per_cell(FloatVal::SIZE)
        .num_planes_to_reserve(config.planes_to_reserve)
        .set_empty_cell_vals(move |_: &CellInds, _: &Lattice, _: &mut [i32], floats: &mut [f64]| {
            floats[FloatVal::COLOR] = lock_rng(&color_rng).get_num_in_open_interval_from_0_to_1();
        });

    let mut sim = Simulation::new(params)?;
    prepare_simulation(&mut sim, run, &rng)?;

    let flux = run.flux;
    let num_mixes = Arc::new(AtomicU64::new(0));
    add_events(&mut sim, config, &rng, &num_mixes)?;

    let deposition_time = run.deposition_time();
    let snapshots = add_snapshot_action(
        &mut sim,
        Actions::PRINT as i32,
        run,
        SnapshotSeries::new(
            Point3dSnapshot {
                occupied_int: IntVal::IS_OCCUPIED,
                value_float: FloatVal::COLOR,
            },
            &run.output_dir,
            &run.file_root,
        ),
    )?;
    add_progress_action(&mut sim, Actions::PROGRESS as i32, deposition_time, reporter)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Deposition ===
    reporter.report(Progress::PhaseStart { name: "Deposition" });
    info!(
        flux,
        deposition_time,
        tracking = %config.tracking,
        "Starting ballistic deposition."
    );
    sim.run(deposition_time)?;
    reporter.report(Progress::RunFinish);
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Results ===
    let summary = BallisticSummary {
        seed: run.seed,
        solver: run.solver,
        rng: run.rng,
        tracking: config.tracking,
        elapsed_time: sim.elapsed_time(),
        num_events: sim.num_local_events(),
        num_mixes: num_mixes.load(Ordering::Relaxed),
        film_height: sim.lattice().curr_height(),
        snapshots: finish_series(&snapshots)?,
    };
    write_summary(&summary, &run.output_dir)?;
    reporter.report(Progress::Message(format!(
        "Number of color mixes = {}",
        summary.num_mixes
    )));
    info!(
        num_mixes = summary.num_mixes,
        num_events = summary.num_events,
        "Ballistic deposition complete."
    );
    Ok(summary)
}

fn add_events(
    sim: &mut Simulation,
    config: &BallisticConfig,
    rng: &RandNumGenSharedPtr,
    num_mixes: &Arc<AtomicU64>,
) -> Result<(), EngineError> {
    let flux = config.run.flux;
    let mix_cno = mix_offsets()?;
    let mut mix_exec = EventExecutorGroup::new(CellCenteredEvents::SIZE);

    sim.reserve_over_lattice_events(OverLatticeEvents::SIZE);
    match config.tracking {
        TrackingMode::Auto => {
            sim.add_over_lattice_event(
                OverLatticeEvents::DEPOSITION as i32,
                flux,
                deposit_tracked,
            )?;
            let mixer = ColorMixer::new(rng, &mix_cno, num_mixes);
            mix_exec.add_event_executor(
                CellCenteredEvents::COLOR_MIXING,
                move |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice| {
                    let color = mixer.mixed_color(ci, lattice);
                    lattice.set_float(ci, FloatVal::COLOR, color);
                },
            )?;
        }
        TrackingMode::SemiManual => {
            let bbox = sim.lattice_global_planar_bbox();
            let mut depositor = DeclaredDepositor::new(bbox.i_extent(), bbox.j_extent());
            sim.add_over_lattice_event_semi_manual(
                OverLatticeEvents::DEPOSITION as i32,
                flux,
                move |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice, ctc: &mut [CellsToChange]| {
                    depositor.deposit(ci, lattice, &mut ctc[0]);
                },
                vec![CellNeighOffsets::default()],
            )?;
            let mixer = ColorMixer::new(rng, &mix_cno, num_mixes);
            mix_exec.add_event_executor_semi_manual(
                CellCenteredEvents::COLOR_MIXING,
                move |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice, ctc: &mut [CellsToChange]| {
                    let color = mixer.mixed_color(ci, lattice);
                    ctc[0].set_center(ci);
                    ctc[0].set_float(lattice, MixOffset::SELF, FloatVal::COLOR, color);
                },
                vec![CellNeighOffsets::default()],
            )?;
        }
    }

    let mix_per_neighbor = config.mix_rate_factor * flux;
    sim.reserve_cell_centered_event_groups(1, CellCenteredEvents::SIZE);
    sim.add_cell_centered_event_group(
        MIX_GROUP,
        mix_cno,
        move |probe: &CellNeighProbe<'_>, out: &mut [f64]| {
            out[CellCenteredEvents::COLOR_MIXING] = mix_propensity(probe, mix_per_neighbor);
        },
        mix_exec,
    )
}

fn mix_offsets() -> Result<CellNeighOffsets, EngineError> {
    Ok(CellNeighOffsets::new(MixOffset::SIZE)?
        .with_offset(MixOffset::NORTH, CellIndsOffset::new(1, 0, 0))?
        .with_offset(MixOffset::SOUTH, CellIndsOffset::new(-1, 0, 0))?
        .with_offset(MixOffset::WEST, CellIndsOffset::new(0, -1, 0))?
        .with_offset(MixOffset::EAST, CellIndsOffset::new(0, 1, 0))?
        .with_offset(MixOffset::UP, CellIndsOffset::new(0, 0, 1))?
        .with_offset(MixOffset::DOWN, CellIndsOffset::new(0, 0, -1))?)
}

/// Ballistic deposition on a cubic lattice (Meakin and Krug, Phys. Rev. A 46,
/// 3390, 1992): the atom sticks at the column's active zone height, and
/// lateral neighbors below that height are raised to it.
fn deposit_tracked(ci: &CellInds, _: &SimulationState, lattice: &mut Lattice) {
    let column = CellInds::new(ci.i, ci.j, 0);
    let k_dep = lattice.get_int(&column, IntVal::ACTIVE_ZONE_HEIGHT);

    lattice.add_planes(k_dep - ci.k);
    lattice.set_int(
        &CellInds::new(ci.i, ci.j, k_dep),
        IntVal::IS_OCCUPIED,
        1,
    );

    for off in LATERAL {
        let neigh = column + off;
        if lattice.get_int(&neigh, IntVal::ACTIVE_ZONE_HEIGHT) < k_dep {
            lattice.set_int(&neigh, IntVal::ACTIVE_ZONE_HEIGHT, k_dep);
        }
    }
    lattice.set_int(&column, IntVal::ACTIVE_ZONE_HEIGHT, k_dep + 1);
}

/// The same deposition rule with the active zone kept outside the lattice,
/// so the only cell written is the one the atom lands in.
struct DeclaredDepositor {
    dims: [i32; 2],
    active_zone: Vec<i32>,
}

impl DeclaredDepositor {
    fn new(i_extent: i32, j_extent: i32) -> Self {
        Self {
            dims: [i_extent, j_extent],
            active_zone: vec![0; (i_extent * j_extent) as usize],
        }
    }

    fn column(&self, i: i32, j: i32) -> usize {
        let i = crate::core::cell::wrap_ind(i, self.dims[0]);
        let j = crate::core::cell::wrap_ind(j, self.dims[1]);
        (i * self.dims[1] + j) as usize
    }

    fn deposit(&mut self, ci: &CellInds, lattice: &mut Lattice, ctc: &mut CellsToChange) {
        let here = self.column(ci.i, ci.j);
        let k_dep = self.active_zone[here];
        let to = CellInds::new(ci.i, ci.j, k_dep);

        ctc.set_center(&to);
        ctc.add_lattice_planes(lattice, to.k - ci.k);
        ctc.set_int(lattice, 0, IntVal::IS_OCCUPIED, 1);

        for off in LATERAL {
            let neigh = self.column(ci.i + off.i, ci.j + off.j);
            if self.active_zone[neigh] < k_dep {
                self.active_zone[neigh] = k_dep;
            }
        }
        self.active_zone[here] += 1;
    }
}

fn mix_propensity(probe: &CellNeighProbe<'_>, per_neighbor: f64) -> f64 {
    let occupied = |which| probe.get_int(&probe.get_cell_to_probe(which), IntVal::IS_OCCUPIED) > 0;
    if !occupied(MixOffset::SELF) {
        return 0.0;
    }

    let mut num_neighs = (MixOffset::NORTH..=MixOffset::EAST)
        .filter(|&which| occupied(which))
        .count();

    let down = probe.get_cell_to_probe(MixOffset::DOWN);
    if probe.below_lattice_bottom(&down) || occupied(MixOffset::DOWN) {
        num_neighs += 1;
    }
    let up = probe.get_cell_to_probe(MixOffset::UP);
    if !probe.exceeds_lattice_height(&up) && occupied(MixOffset::UP) {
        num_neighs += 1;
    }

    per_neighbor * num_neighs as f64
}

/// Averages a cell's color with its occupied neighbors. The substrate below
/// the first plane counts as occupied with a freshly drawn color.
struct ColorMixer {
    rng: RandNumGenSharedPtr,
    offsets: CellNeighOffsets,
    num_mixes: Arc<AtomicU64>,
}

impl ColorMixer {
    fn new(rng: &RandNumGenSharedPtr, offsets: &CellNeighOffsets, num_mixes: &Arc<AtomicU64>) -> Self {
        Self {
            rng: Arc::clone(rng),
            offsets: offsets.clone(),
            num_mixes: Arc::clone(num_mixes),
        }
    }

    fn mixed_color(&self, ci: &CellInds, lattice: &Lattice) -> f64 {
        let mut color = lattice.get_float(ci, FloatVal::COLOR);
        let mut num_colors = 1.0;

        for which in MixOffset::NORTH..=MixOffset::EAST {
            let neigh = *ci + self.offsets.get_offset(which);
            if lattice.get_int(&neigh, IntVal::IS_OCCUPIED) > 0 {
                color += lattice.get_float(&neigh, FloatVal::COLOR);
                num_colors += 1.0;
            }
        }

        let down = *ci + self.offsets.get_offset(MixOffset::DOWN);
        if down.k < 0 {
            color += lock_rng(&self.rng).get_num_in_open_interval_from_0_to_1();
            num_colors += 1.0;
        } else if lattice.get_int(&down, IntVal::IS_OCCUPIED) > 0 {
            color += lattice.get_float(&down, FloatVal::COLOR);
            num_colors += 1.0;
        }

        let up = *ci + self.offsets.get_offset(MixOffset::UP);
        if up.k < lattice.curr_height() && lattice.get_int(&up, IntVal::IS_OCCUPIED) > 0 {
            color += lattice.get_float(&up, FloatVal::COLOR);
            num_colors += 1.0;
        }

        self.num_mixes.fetch_add(1, Ordering::Relaxed);
        color / num_colors
    }
}
