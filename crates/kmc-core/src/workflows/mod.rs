//! # Workflows Module
//!
//! Ready-to-run growth models built on the [`Simulation`] driver.
//!
//! ## Overview
//!
//! Each workflow takes a validated configuration, builds the lattice and its
//! events, runs the schedule, writes numbered snapshots plus a `summary.toml`
//! into the output directory, and returns a serializable summary.
//!
//! ## Architecture
//!
//! - **Ballistic Deposition** ([`ballistic`]) - Columnar ballistic growth with
//!   color mixing between touching atoms
//! - **Fractal Islands** ([`fractal`]) - Diffusion-limited island growth on a
//!   height map, followed by a relaxation period without deposition
//! - **Patterned Substrate** ([`patterned`]) - Arrhenius surface diffusion
//!   over a substrate whose binding energy varies periodically in the plane
//!
//! ## Key Capabilities
//!
//! - **Both tracking styles** for every model, selected by configuration
//! - **Progress monitoring** through periodic actions feeding a [`ProgressReporter`]
//! - **Deferred I/O errors** so a failed snapshot aborts the workflow after the run

pub mod ballistic;
mod columns;
pub mod fractal;
pub mod patterned;

use crate::core::io::series::{SharedSeriesRecord, SnapshotSeries};
use crate::core::io::traits::SnapshotFormat;
use crate::core::lattice::Lattice;
use crate::core::rng::RandNumGenSharedPtr;
use crate::engine::config::RunConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::simulation::Simulation;
use crate::engine::state::SimulationState;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tracing::info;

/// Number of progress updates sent over the whole simulated time.
const PROGRESS_CHUNKS: u64 = 100;

pub const SUMMARY_FILE: &str = "summary.toml";

fn prepare_output_dir(dir: &Path) -> Result<(), EngineError> {
    std::fs::create_dir_all(dir).map_err(|source| EngineError::Output {
        path: dir.display().to_string(),
        source,
    })
}

fn prepare_simulation(
    sim: &mut Simulation,
    run: &RunConfig,
    rng: &RandNumGenSharedPtr,
) -> Result<(), EngineError> {
    sim.set_solver(run.solver);
    sim.set_rng(Arc::clone(rng))
}

/// Registers a time-periodic action writing `series` every
/// `run.snapshot_fraction` of the deposition time and at the end of each run.
fn add_snapshot_action<F>(
    sim: &mut Simulation,
    action_id: i32,
    run: &RunConfig,
    mut series: SnapshotSeries<F>,
) -> Result<SharedSeriesRecord, EngineError>
where
    F: SnapshotFormat + Send + 'static,
{
    let record = series.record();
    sim.add_time_periodic_action(
        action_id,
        move |state: &SimulationState, lattice: &mut Lattice| {
            series.write_next(lattice, state.elapsed_time());
        },
        run.snapshot_fraction * run.deposition_time(),
        true,
    )?;
    Ok(record)
}

/// Registers a time-periodic action reporting progress over `total_time`.
fn add_progress_action(
    sim: &mut Simulation,
    action_id: i32,
    total_time: f64,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    let reporter = reporter.clone();
    reporter.report(Progress::RunStart {
        total_chunks: PROGRESS_CHUNKS,
    });
    sim.add_time_periodic_action(
        action_id,
        move |state: &SimulationState, _: &mut Lattice| {
            reporter.report(Progress::RunAdvance {
                elapsed_time: state.elapsed_time(),
                num_events: state.num_local_events(),
            });
        },
        total_time / PROGRESS_CHUNKS as f64,
        false,
    )
}

/// Runs deposition for `deposition_time`, removes the deposition event, then
/// lets the surface relax for `relax_time` when it is positive.
fn deposit_then_relax(
    sim: &mut Simulation,
    reporter: &ProgressReporter,
    deposition_event: i32,
    deposition_time: f64,
    relax_time: f64,
) -> Result<(), EngineError> {
    reporter.report(Progress::PhaseStart { name: "Deposition" });
    sim.run(deposition_time)?;

    sim.remove_over_lattice_event(deposition_event)?;
    if relax_time > 0.0 {
        reporter.report(Progress::PhaseFinish);
        reporter.report(Progress::PhaseStart { name: "Relaxation" });
        info!(relax_time, "Deposition stopped, relaxing surface.");
        sim.run(relax_time)?;
    }
    reporter.report(Progress::RunFinish);
    reporter.report(Progress::PhaseFinish);
    Ok(())
}

/// Turns the first deferred snapshot failure into an error, or returns the
/// paths that were written.
fn finish_series(record: &SharedSeriesRecord) -> Result<Vec<PathBuf>, EngineError> {
    let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some((path, source)) = record.failure.take() {
        return Err(EngineError::Output {
            path: path.display().to_string(),
            source,
        });
    }
    Ok(std::mem::take(&mut record.written))
}

fn write_summary<T: Serialize>(summary: &T, dir: &Path) -> Result<PathBuf, EngineError> {
    let path = dir.join(SUMMARY_FILE);
    let output_err = |source: io::Error| EngineError::Output {
        path: path.display().to_string(),
        source,
    };
    let text = toml::to_string_pretty(summary).map_err(|e| output_err(io::Error::other(e)))?;
    std::fs::write(&path, text).map_err(output_err)?;
    info!(path = %path.display(), "Summary written.");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Example {
        seed: u64,
        files: Vec<PathBuf>,
    }

    #[test]
    fn summary_is_written_as_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_summary(
            &Example {
                seed: 7,
                files: vec![PathBuf::from("a1.dat")],
            },
            dir.path(),
        )
        .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("seed = 7"));
        assert!(text.contains("a1.dat"));
    }

    #[test]
    fn output_dir_is_created_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        prepare_output_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
