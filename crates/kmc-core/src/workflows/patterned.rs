use super::columns::{self, HOP_DIRECTIONS};
use super::{
    add_progress_action, add_snapshot_action, deposit_then_relax, finish_series,
    prepare_output_dir, prepare_simulation, write_summary,
};
use crate::core::cell::{CellInds, wrap_ind};
use crate::core::io::height_map::HeightMapSnapshot;
use crate::core::io::series::SnapshotSeries;
use crate::core::lattice::{Lattice, LatticeParams};
use crate::core::neighbors::{CellNeighOffsets, CellNeighProbe};
use crate::core::rng::{RngKind, mk_rng};
use crate::engine::config::{PatternedConfig, SolverId, SubstrateSource, TrackingMode};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::simulation::Simulation;
use crate::engine::state::SimulationState;
use crate::{id_enum, offset_enum};
use itertools::iproduct;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

id_enum!(pub IntVal { HEIGHT });
id_enum!(pub FloatVal { E_S });
offset_enum!(pub HopOffset { UP, DOWN, LEFT, RIGHT });

id_enum!(CellCenteredEvents { HOP_UP, HOP_DOWN, HOP_LEFT, HOP_RIGHT });
id_enum!(OverLatticeEvents { DEPOSITION });
id_enum!(Actions { PRINT, PROGRESS });

const HOP_GROUP: i32 = 1;

/// Boltzmann constant in eV/K.
pub const BOLTZMANN_EV: f64 = 8.6173324e-5;
/// Planck constant in eV s.
pub const PLANCK_EV: f64 = 4.135667516e-15;

/// Substrate energy `E_s` of one pattern tile. The tile repeats periodically
/// over the lattice plane.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstratePattern {
    dims: [i32; 2],
    energies: Vec<f64>,
}

impl SubstratePattern {
    /// A square tile of side `2 * half_width`. Each cell takes the energy of
    /// its distance to the nearest tile border, ramping linearly from
    /// `e_edge` on the border to `e_mid` on the innermost ring.
    pub fn ramp(e_edge: f64, e_mid: f64, half_width: usize) -> Self {
        let n = 2 * half_width;
        let spacing = 1.0 / half_width.saturating_sub(1).max(1) as f64;
        let fold = |x: usize| if x >= half_width { n - 1 - x } else { x };
        let energies = iproduct!(0..n, 0..n)
            .map(|(i, j)| (e_mid - e_edge) * (fold(i).min(fold(j)) as f64 * spacing) + e_edge)
            .collect();
        Self {
            dims: [n as i32; 2],
            energies,
        }
    }

    /// Reads a tile from a space separated file: an `ni nj` header line, then
    /// one `i j E_s` line per cell. Cells the file leaves out have zero energy.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let fail = |reason: String| {
            EngineError::Initialization(format!(
                "Substrate pattern '{}': {reason}",
                path.display()
            ))
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| fail(e.to_string()))?;
        let mut records = reader.records();

        let header = records
            .next()
            .ok_or_else(|| fail("the file is empty".to_string()))?
            .map_err(|e| fail(e.to_string()))?;
        let (ni, nj): (i32, i32) = header.deserialize(None).map_err(|e| fail(e.to_string()))?;
        if ni <= 0 || nj <= 0 {
            return Err(fail(format!("dimensions must be positive, got {ni} x {nj}")));
        }

        let mut energies = vec![0.0; ni as usize * nj as usize];
        for record in records {
            let record = record.map_err(|e| fail(e.to_string()))?;
            let (i, j, e_s): (i32, i32, f64) =
                record.deserialize(None).map_err(|e| fail(e.to_string()))?;
            if !(0..ni).contains(&i) || !(0..nj).contains(&j) {
                return Err(fail(format!(
                    "cell ({i}, {j}) lies outside the {ni} x {nj} pattern"
                )));
            }
            energies[(i * nj + j) as usize] = e_s;
        }
        debug!(path = %path.display(), ni, nj, "Substrate pattern loaded.");
        Ok(Self {
            dims: [ni, nj],
            energies,
        })
    }

    pub fn load(source: &SubstrateSource) -> Result<Self, EngineError> {
        match source {
            SubstrateSource::Ramp {
                e_edge,
                e_mid,
                half_width,
            } => Ok(Self::ramp(*e_edge, *e_mid, *half_width)),
            SubstrateSource::File(path) => Self::from_file(path),
        }
    }

    pub fn dims(&self) -> [i32; 2] {
        self.dims
    }

    /// Energy at lattice position `(i, j)`, repeating the tile in both directions.
    pub fn energy(&self, i: i32, j: i32) -> f64 {
        let i = wrap_ind(i, self.dims[0]);
        let j = wrap_ind(j, self.dims[1]);
        self.energies[(i * self.dims[1] + j) as usize]
    }
}

/// Arrhenius hop rate `(kB T / h) exp(-E / kB T)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HopRate {
    e_n: f64,
    k_bt: f64,
    prefactor: f64,
}

impl HopRate {
    fn new(e_n: f64, temperature: f64) -> Self {
        let k_bt = BOLTZMANN_EV * temperature;
        Self {
            e_n,
            k_bt,
            prefactor: k_bt / PLANCK_EV,
        }
    }

    /// Rate of leaving a site of substrate energy `e_s` with `bonds` lateral
    /// neighbors at least as tall.
    fn rate(&self, e_s: f64, bonds: usize) -> f64 {
        let barrier = e_s + bonds as f64 * self.e_n;
        self.prefactor * (-barrier / self.k_bt).exp()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternedSummary {
    pub seed: u64,
    pub solver: SolverId,
    pub rng: RngKind,
    pub tracking: TrackingMode,
    pub temperature: f64,
    pub substrate_dims: [i32; 2],
    pub deposition_time: f64,
    pub elapsed_time: f64,
    pub num_events: u64,
    /// Atoms on the surface; hops conserve it, so it equals the number of
    /// depositions.
    pub deposited_atoms: i64,
    pub max_height: i32,
    pub snapshots: Vec<PathBuf>,
}

#[instrument(skip_all, name = "patterned_workflow")]
pub fn run(
    config: &PatternedConfig,
    reporter: &ProgressReporter,
) -> Result<PatternedSummary, EngineError> {
    // === Phase 0: Substrate, lattice and events ===
    reporter.report(Progress::PhaseStart { name: "Setup" });
    let run = &config.run;
    let pattern = SubstratePattern::load(&config.substrate)?;
    let substrate_dims = pattern.dims();
    let params = lattice_params(run.domain_size, pattern)?;
    prepare_output_dir(&run.output_dir)?;

    let mut sim = Simulation::new(params)?;
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
        temperature = config.temperature,
        e_n = config.e_n,
        substrate_ni = substrate_dims[0],
        substrate_nj = substrate_dims[1],
        deposition_time,
        tracking = %config.tracking,
        "Starting growth on the patterned substrate."
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
    let summary = PatternedSummary {
        seed: run.seed,
        solver: run.solver,
        rng: run.rng,
        tracking: config.tracking,
        temperature: config.temperature,
        substrate_dims,
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
        "Patterned substrate growth complete."
    );
    Ok(summary)
}

/// A square lattice of side `domain_size` whose single plane holds the tiled
/// substrate energies.
fn lattice_params(
    domain_size: i32,
    pattern: SubstratePattern,
) -> Result<LatticeParams, EngineError> {
    let [pi, pj] = pattern.dims();
    if pi <= 0 || pj <= 0 || domain_size % pi != 0 || domain_size % pj != 0 {
        return Err(EngineError::Initialization(format!(
            "Lattice side {domain_size} is not a whole number of {pi} x {pj} substrate pattern tiles."
        )));
    }
    Ok(LatticeParams::new()
        .global_planar_dims(domain_size, domain_size)
        .num_ints_per_cell(IntVal::SIZE)
        .num_floats_per_cell(FloatVal::SIZE)
        .lat_init(move |lattice: &mut Lattice| {
            lattice.add_planes(1);
            let bbox = lattice.local_planar_bbox(false);
            for (i, j) in iproduct!(bbox.imin..bbox.imax_p1, bbox.jmin..bbox.jmax_p1) {
                lattice.set_float(&CellInds::new(i, j, 0), FloatVal::E_S, pattern.energy(i, j));
            }
        }))
}

/// Deposition is always recorded automatically; with semi-manual tracking
/// the hops declare their two cells.
fn add_events(sim: &mut Simulation, config: &PatternedConfig) -> Result<(), EngineError> {
    sim.reserve_over_lattice_events(OverLatticeEvents::SIZE);
    sim.add_over_lattice_event(
        OverLatticeEvents::DEPOSITION as i32,
        config.run.flux,
        |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice| {
            columns::deposit(ci, IntVal::HEIGHT, lattice);
        },
    )?;

    let rate = HopRate::new(config.e_n, config.temperature);
    sim.reserve_cell_centered_event_groups(1, CellCenteredEvents::SIZE);
    sim.add_cell_centered_event_group(
        HOP_GROUP,
        hop_offsets()?,
        move |probe: &CellNeighProbe<'_>, out: &mut [f64]| {
            out.fill(hop_propensity(probe, &rate));
        },
        columns::hop_executors(IntVal::HEIGHT, config.tracking)?,
    )
}

fn hop_offsets() -> Result<CellNeighOffsets, EngineError> {
    Ok(CellNeighOffsets::new(HopOffset::SIZE)?
        .with_offset(HopOffset::UP, HOP_DIRECTIONS[CellCenteredEvents::HOP_UP])?
        .with_offset(HopOffset::DOWN, HOP_DIRECTIONS[CellCenteredEvents::HOP_DOWN])?
        .with_offset(HopOffset::LEFT, HOP_DIRECTIONS[CellCenteredEvents::HOP_LEFT])?
        .with_offset(HopOffset::RIGHT, HOP_DIRECTIONS[CellCenteredEvents::HOP_RIGHT])?)
}

/// Every direction gets the same rate. Each of the four lateral neighbors at
/// least as tall as the column adds one bond; empty columns cannot hop.
fn hop_propensity(probe: &CellNeighProbe<'_>, rate: &HopRate) -> f64 {
    let center = probe.get_cell_to_probe(HopOffset::SELF);
    let h = probe.get_int(&center, IntVal::HEIGHT);
    if h <= 0 {
        return 0.0;
    }
    let bonds = (HopOffset::UP..HopOffset::SIZE)
        .filter(|&which| probe.get_int(&probe.get_cell_to_probe(which), IntVal::HEIGHT) >= h)
        .count();
    rate.rate(probe.get_float(&center, FloatVal::E_S), bonds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::PatternedConfigBuilder;
    use std::fs;

    const SMALL_RAMP: SubstrateSource = SubstrateSource::Ramp {
        e_edge: 0.9,
        e_mid: 1.0,
        half_width: 2,
    };

    fn config(dir: &Path, tracking: TrackingMode, substrate: SubstrateSource) -> PatternedConfig {
        PatternedConfigBuilder::new()
            .flux(1.0)
            .max_coverage(0.5)
            .domain_size(8)
            .seed(11)
            .snapshot_fraction(0.5)
            .temperature(390.0)
            .e_n(0.18)
            .substrate(substrate)
            .tracking(tracking)
            .output_dir(dir.to_path_buf())
            .file_root("height")
            .build()
            .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * b.abs()
    }

    #[test]
    fn ramp_rises_from_edge_to_middle() {
        let pattern = SubstratePattern::ramp(0.65, 0.85, 3);
        assert_eq!(pattern.dims(), [6, 6]);
        assert_eq!(pattern.energy(0, 0), 0.65);
        assert_eq!(pattern.energy(5, 2), 0.65);
        assert!(close(pattern.energy(1, 4), 0.75));
        assert!(close(pattern.energy(2, 2), 0.85));
        assert!(close(pattern.energy(3, 3), 0.85));
        assert_eq!(pattern.energy(6, -6), pattern.energy(0, 0));
        assert_eq!(pattern.energy(-1, 8), pattern.energy(5, 2));
    }

    #[test]
    fn pattern_file_is_read_cell_by_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.dat");
        fs::write(&path, "2 3\n0 0 0.5\n0 1 0.6\n0 2 0.7\n1 0 0.8\n1 1 0.9\n").unwrap();

        let pattern = SubstratePattern::from_file(&path).unwrap();
        assert_eq!(pattern.dims(), [2, 3]);
        assert_eq!(pattern.energy(0, 2), 0.7);
        assert_eq!(pattern.energy(1, 1), 0.9);
        assert_eq!(pattern.energy(1, 2), 0.0);
        assert_eq!(pattern.energy(3, 4), 0.9);
    }

    #[test]
    fn malformed_pattern_files_fail_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("empty.dat", ""),
            ("outside.dat", "2 2\n0 0 0.5\n2 0 0.5\n"),
            ("text.dat", "2 2\n0 0 high\n"),
            ("zero.dat", "0 4\n"),
        ];
        for (name, text) in cases {
            let path = dir.path().join(name);
            fs::write(&path, text).unwrap();
            let err = SubstratePattern::from_file(&path).unwrap_err();
            assert!(
                matches!(err, EngineError::Initialization(ref msg) if msg.contains(name)),
                "{name}: {err}"
            );
        }
        let missing = SubstratePattern::from_file(&dir.path().join("missing.dat"));
        assert!(matches!(missing, Err(EngineError::Initialization(_))));
    }

    #[test]
    fn lattice_side_must_hold_whole_tiles() {
        let pattern = SubstratePattern::ramp(0.6, 0.8, 2);
        let err = lattice_params(6, pattern.clone()).unwrap_err();
        assert!(matches!(err, EngineError::Initialization(ref msg) if msg.contains("4 x 4")));

        let lattice = Lattice::new(lattice_params(8, pattern).unwrap()).unwrap();
        assert_eq!(lattice.curr_height(), 1);
        assert!(close(lattice.get_float(&CellInds::new(5, 6, 0), FloatVal::E_S), 0.8));
        assert_eq!(lattice.get_float(&CellInds::new(4, 7, 0), FloatVal::E_S), 0.6);
    }

    #[test]
    fn hop_propensity_counts_bonds_to_taller_neighbors() {
        let mut lattice =
            Lattice::new(lattice_params(8, SubstratePattern::ramp(0.6, 0.8, 2)).unwrap()).unwrap();
        let offsets = hop_offsets().unwrap();
        let set = |lattice: &mut Lattice, i, j, h| {
            lattice.set_int(&CellInds::new(i, j, 0), IntVal::HEIGHT, h);
        };
        set(&mut lattice, 1, 1, 2);
        set(&mut lattice, 1, 2, 2);
        set(&mut lattice, 0, 1, 3);
        set(&mut lattice, 2, 1, 1);
        set(&mut lattice, 7, 7, 1);

        let rate = HopRate::new(0.18, 390.0);
        let k_bt = BOLTZMANN_EV * 390.0;
        let expected = |e: f64| k_bt / PLANCK_EV * (-e / k_bt).exp();

        let middle = CellNeighProbe::new(&lattice, CellInds::new(1, 1, 0), offsets.offsets());
        assert!(close(hop_propensity(&middle, &rate), expected(0.8 + 2.0 * 0.18)));

        let corner = CellNeighProbe::new(&lattice, CellInds::new(7, 7, 0), offsets.offsets());
        assert!(close(hop_propensity(&corner, &rate), expected(0.6)));

        let empty = CellNeighProbe::new(&lattice, CellInds::new(4, 4, 0), offsets.offsets());
        assert_eq!(hop_propensity(&empty, &rate), 0.0);

        // Hotter substrates hop faster.
        let hot = HopRate::new(0.18, 600.0);
        assert!(hop_propensity(&corner, &hot) > hop_propensity(&corner, &rate));
    }

    #[test]
    fn workflow_conserves_deposited_atoms() {
        for tracking in [TrackingMode::Auto, TrackingMode::SemiManual] {
            let dir = tempfile::tempdir().unwrap();
            let summary =
                run(&config(dir.path(), tracking, SMALL_RAMP), &ProgressReporter::new()).unwrap();

            assert!(summary.deposited_atoms > 0, "{tracking}");
            assert!(summary.num_events as i64 > summary.deposited_atoms, "{tracking}");
            assert_eq!(summary.substrate_dims, [4, 4]);
            assert!(dir.path().join("summary.toml").is_file());

            let last = fs::read_to_string(summary.snapshots.last().unwrap()).unwrap();
            let mut lines = last.lines();
            assert!(lines.next().unwrap().starts_with("# 0 8 0 8 time:"));
            let total: i64 = lines
                .map(|line| line.split(' ').nth(2).unwrap().parse::<i64>().unwrap())
                .inspect(|&h| assert!(h >= 0))
                .sum();
            assert_eq!(total, summary.deposited_atoms);
        }
    }

    #[test]
    fn same_seed_reproduces_the_surface() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let first = run(
            &config(a.path(), TrackingMode::SemiManual, SMALL_RAMP),
            &ProgressReporter::new(),
        )
        .unwrap();
        let second = run(
            &config(b.path(), TrackingMode::SemiManual, SMALL_RAMP),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(first.num_events, second.num_events);
        assert_eq!(first.elapsed_time, second.elapsed_time);
        assert_eq!(
            fs::read_to_string(first.snapshots.last().unwrap()).unwrap(),
            fs::read_to_string(second.snapshots.last().unwrap()).unwrap()
        );
    }

    #[test]
    fn file_substrate_with_wrong_tile_size_stops_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("tile.dat");
        fs::write(&pattern, "3 3\n1 1 0.9\n").unwrap();
        let out = dir.path().join("out");

        let result = run(
            &config(&out, TrackingMode::Auto, SubstrateSource::File(pattern)),
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::Initialization(_))));
        assert!(!out.exists());
    }
}
