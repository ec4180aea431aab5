use crate::cli::{RunArgs, RunModel};
use crate::config::{
    AppConfig, build_ballistic_config, build_fractal_config, build_patterned_config,
};
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use kmcthinfilm::workflows;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let config = match &args.model {
        RunModel::Ballistic(model_args) => build_ballistic_config(model_args)?,
        RunModel::Fractal(model_args) => build_fractal_config(model_args)?,
        RunModel::Patterned(model_args) => build_patterned_config(model_args)?,
    };
    let run = config.run();
    info!(
        model = config.name(),
        seed = run.seed,
        solver = %run.solver,
        domain_size = run.domain_size,
        "Configuration resolved."
    );

    let reporter = CliProgressHandler::new(ui_sender).reporter();

    println!(
        "Starting {} growth on a {}x{} lattice...",
        config.name(),
        run.domain_size,
        run.domain_size
    );
    match &config {
        AppConfig::Ballistic(core_config) => {
            let summary = tokio::task::block_in_place(|| {
                workflows::ballistic::run(core_config, &reporter)
            })?;
            println!(
                "✓ {} events, {} color mixes, film height {} after t = {:.4}",
                summary.num_events, summary.num_mixes, summary.film_height, summary.elapsed_time
            );
            report_outputs(summary.snapshots.len(), &config);
        }
        AppConfig::Fractal(core_config) => {
            let summary = tokio::task::block_in_place(|| {
                workflows::fractal::run(core_config, &reporter)
            })?;
            println!(
                "✓ {} events, {} atoms deposited, tallest column {} after t = {:.4}",
                summary.num_events,
                summary.deposited_atoms,
                summary.max_height,
                summary.elapsed_time
            );
            report_outputs(summary.snapshots.len(), &config);
        }
        AppConfig::Patterned(core_config) => {
            let summary = tokio::task::block_in_place(|| {
                workflows::patterned::run(core_config, &reporter)
            })?;
            println!(
                "✓ {} events, {} atoms deposited on {}x{} substrate tiles, tallest column {} after t = {:.4}",
                summary.num_events,
                summary.deposited_atoms,
                summary.substrate_dims[0],
                summary.substrate_dims[1],
                summary.max_height,
                summary.elapsed_time
            );
            report_outputs(summary.snapshots.len(), &config);
        }
    }

    Ok(())
}

fn report_outputs(num_snapshots: usize, config: &AppConfig) {
    println!(
        "  {} snapshot(s) written to: {}",
        num_snapshots,
        config.output_dir().display()
    );
    println!("  Summary written to: {}", config.summary_path().display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{FractalArgs, PatternedArgs, RunArgs};
    use once_cell::sync::Lazy;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fractal_run_writes_summary() {
        let output_dir = TEST_DIR.path().join("fractal");
        let mut model_args = FractalArgs::default();
        model_args.common.output_dir = Some(output_dir.clone());
        model_args.common.domain_size = Some(8);
        model_args.common.max_coverage = Some(0.25);
        model_args.d_over_f = Some(10.0);
        let (sender, _receiver) = mpsc::channel(1024);

        run(
            RunArgs {
                model: RunModel::Fractal(model_args),
            },
            sender,
        )
        .await
        .unwrap();

        let summary = std::fs::read_to_string(output_dir.join(workflows::SUMMARY_FILE)).unwrap();
        assert!(summary.contains("seed = 42"));
        assert!(summary.contains("tracking = \"auto\""));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn patterned_run_tiles_a_small_ramp() {
        let output_dir = TEST_DIR.path().join("patterned");
        let mut model_args = PatternedArgs::default();
        model_args.common.output_dir = Some(output_dir.clone());
        model_args.common.domain_size = Some(8);
        model_args.common.flux = Some(1.0);
        model_args.common.max_coverage = Some(0.25);
        model_args.half_width = Some(2);
        model_args.e_edge = Some(0.9);
        model_args.e_mid = Some(1.0);
        let (sender, _receiver) = mpsc::channel(1024);

        run(
            RunArgs {
                model: RunModel::Patterned(model_args),
            },
            sender,
        )
        .await
        .unwrap();

        let summary = std::fs::read_to_string(output_dir.join(workflows::SUMMARY_FILE)).unwrap();
        let summary: toml::Value = toml::from_str(&summary).unwrap();
        assert_eq!(summary["temperature"].as_float(), Some(390.0));
        let dims: Vec<i64> = summary["substrate_dims"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_integer().unwrap())
            .collect();
        assert_eq!(dims, vec![4, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn configuration_errors_stop_before_running() {
        let mut model_args = FractalArgs::default();
        model_args.common.output_dir = Some(TEST_DIR.path().join("never"));
        model_args.d_over_f = Some(0.0);
        let (sender, _receiver) = mpsc::channel(1);

        let result = run(
            RunArgs {
                model: RunModel::Fractal(model_args),
            },
            sender,
        )
        .await;

        assert!(matches!(result, Err(crate::error::CliError::Config(_))));
        assert!(!TEST_DIR.path().join("never").exists());
    }
}
