use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FilePatternedConfig, FileRunConfig};
use super::models::AppConfig;
use crate::cli::{BallisticArgs, CommonRunArgs, FractalArgs, ModelKind, PatternedArgs};
use crate::error::{CliError, Result};
use crate::utils::parser::{self, ParseError};
use kmcthinfilm::core::rng::RngKind;
use kmcthinfilm::engine::config::{
    BallisticConfigBuilder, FractalConfigBuilder, PatternedConfigBuilder, SolverId,
    SubstrateSource, TrackingMode,
};
use std::path::PathBuf;

/// Run parameters after merging CLI flags, `--set` overrides, the config
/// file and the built-in defaults, in that order of precedence.
#[derive(Debug)]
struct MergedRun {
    flux: f64,
    max_coverage: f64,
    domain_size: i32,
    seed: u64,
    solver: SolverId,
    rng: RngKind,
    tracking: TrackingMode,
    snapshot_fraction: f64,
    output_dir: PathBuf,
    file_root: String,
}

/// Applies a [`MergedRun`] to either model's config builder.
macro_rules! with_run {
    ($builder:expr, $run:expr) => {
        $builder
            .flux($run.flux)
            .max_coverage($run.max_coverage)
            .domain_size($run.domain_size)
            .seed($run.seed)
            .solver($run.solver)
            .rng($run.rng)
            .snapshot_fraction($run.snapshot_fraction)
            .output_dir($run.output_dir)
            .file_root($run.file_root)
            .tracking($run.tracking)
    };
}

pub fn build_ballistic_config(args: &BallisticArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::for_model(ModelKind::Ballistic);
    let mut file_config = load_file_config(&args.common)?;
    let run = merge_run(&args.common, &file_config, &defaults);

    let model_file = file_config.ballistic.take().unwrap_or_default();
    let config = with_run!(BallisticConfigBuilder::new(), run)
        .mix_rate_factor(
            args.mix_rate_factor
                .or(model_file.mix_rate_factor)
                .unwrap_or(defaults.mix_rate_factor),
        )
        .planes_to_reserve(
            args.planes_to_reserve
                .or(model_file.planes_to_reserve)
                .unwrap_or(defaults.planes_to_reserve),
        )
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(AppConfig::Ballistic(config))
}

pub fn build_fractal_config(args: &FractalArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::for_model(ModelKind::Fractal);
    let mut file_config = load_file_config(&args.common)?;
    let run = merge_run(&args.common, &file_config, &defaults);

    let model_file = file_config.fractal.take().unwrap_or_default();
    let config = with_run!(FractalConfigBuilder::new(), run)
        .d_over_f(
            args.d_over_f
                .or(model_file.d_over_f)
                .unwrap_or(defaults.d_over_f),
        )
        .relax_fraction(
            args.relax_fraction
                .or(model_file.relax_fraction)
                .unwrap_or(defaults.relax_fraction),
        )
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(AppConfig::Fractal(config))
}

pub fn build_patterned_config(args: &PatternedArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::for_model(ModelKind::Patterned);
    let mut file_config = load_file_config(&args.common)?;
    let run = merge_run(&args.common, &file_config, &defaults);

    let model_file = file_config.patterned.take().unwrap_or_default();
    let substrate = match args.pattern_file.clone().or(model_file.pattern_file) {
        Some(path) => SubstrateSource::File(path),
        None => SubstrateSource::Ramp {
            e_edge: args.e_edge.or(model_file.e_edge).unwrap_or(defaults.e_edge),
            e_mid: args.e_mid.or(model_file.e_mid).unwrap_or(defaults.e_mid),
            half_width: args
                .half_width
                .or(model_file.half_width)
                .unwrap_or(defaults.half_width),
        },
    };
    let config = with_run!(PatternedConfigBuilder::new(), run)
        .temperature(
            args.temperature
                .or(model_file.temperature)
                .unwrap_or(defaults.temperature),
        )
        .e_n(args.e_n.or(model_file.e_n).unwrap_or(defaults.e_n))
        .substrate(substrate)
        .relax_fraction(
            args.relax_fraction
                .or(model_file.relax_fraction)
                .unwrap_or(defaults.relax_fraction),
        )
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(AppConfig::Patterned(config))
}

fn load_file_config(common: &CommonRunArgs) -> Result<FileConfig> {
    let file_config = match &common.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    apply_set_values(file_config, &common.set_values)
}

fn merge_run(args: &CommonRunArgs, file: &FileConfig, defaults: &DefaultsConfig) -> MergedRun {
    let run = file.run.clone().unwrap_or_default();
    let output = file.output.clone().unwrap_or_default();
    MergedRun {
        flux: args.flux.or(run.flux).unwrap_or(defaults.flux),
        max_coverage: args
            .max_coverage
            .or(run.max_coverage)
            .unwrap_or(defaults.max_coverage),
        domain_size: args
            .domain_size
            .or(run.domain_size)
            .unwrap_or(defaults.domain_size),
        seed: args.seed.or(run.seed).unwrap_or(defaults.seed),
        solver: args.solver.or(run.solver).unwrap_or(defaults.solver),
        rng: args.rng.or(run.rng).unwrap_or(defaults.rng),
        tracking: args.tracking.or(run.tracking).unwrap_or(defaults.tracking),
        snapshot_fraction: args
            .snapshot_fraction
            .or(run.snapshot_fraction)
            .unwrap_or(defaults.snapshot_fraction),
        output_dir: args
            .output_dir
            .clone()
            .or(output.dir)
            .unwrap_or_else(|| defaults.output_dir.clone()),
        file_root: args
            .file_root
            .clone()
            .or(output.file_root)
            .unwrap_or_else(|| defaults.file_root.clone()),
    }
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        set_value(&mut config, kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
    }
    Ok(config)
}

fn set_value(config: &mut FileConfig, kv_pair: &str) -> std::result::Result<(), SetError> {
    let (key, value) = parser::split_override(kv_pair)?;
    match key {
        "run.flux" => run_section(config).flux = Some(parser::parse_value(key, value)?),
        "run.max-coverage" => run_section(config).max_coverage = Some(parser::parse_value(key, value)?),
        "run.domain-size" => run_section(config).domain_size = Some(parser::parse_value(key, value)?),
        "run.seed" => run_section(config).seed = Some(parser::parse_value(key, value)?),
        "run.solver" => run_section(config).solver = Some(parser::parse_solver(value)?),
        "run.rng" => run_section(config).rng = Some(parser::parse_rng(value)?),
        "run.tracking" => run_section(config).tracking = Some(parser::parse_tracking(value)?),
        "run.snapshot-fraction" => {
            run_section(config).snapshot_fraction = Some(parser::parse_value(key, value)?)
        }
        "output.dir" => {
            config.output.get_or_insert_with(Default::default).dir = Some(PathBuf::from(value))
        }
        "output.file-root" => {
            config.output.get_or_insert_with(Default::default).file_root = Some(value.to_string())
        }
        "ballistic.mix-rate-factor" => {
            config
                .ballistic
                .get_or_insert_with(Default::default)
                .mix_rate_factor = Some(parser::parse_value(key, value)?)
        }
        "ballistic.planes-to-reserve" => {
            config
                .ballistic
                .get_or_insert_with(Default::default)
                .planes_to_reserve = Some(parser::parse_value(key, value)?)
        }
        "fractal.d-over-f" => {
            config.fractal.get_or_insert_with(Default::default).d_over_f =
                Some(parser::parse_value(key, value)?)
        }
        "fractal.relax-fraction" => {
            config
                .fractal
                .get_or_insert_with(Default::default)
                .relax_fraction = Some(parser::parse_value(key, value)?)
        }
        "patterned.temperature" => {
            patterned_section(config).temperature = Some(parser::parse_value(key, value)?)
        }
        "patterned.e-n" => patterned_section(config).e_n = Some(parser::parse_value(key, value)?),
        "patterned.e-edge" => {
            patterned_section(config).e_edge = Some(parser::parse_value(key, value)?)
        }
        "patterned.e-mid" => {
            patterned_section(config).e_mid = Some(parser::parse_value(key, value)?)
        }
        "patterned.half-width" => {
            patterned_section(config).half_width = Some(parser::parse_value(key, value)?)
        }
        "patterned.pattern-file" => {
            patterned_section(config).pattern_file = Some(PathBuf::from(value))
        }
        "patterned.relax-fraction" => {
            patterned_section(config).relax_fraction = Some(parser::parse_value(key, value)?)
        }
        _ => return Err(SetError::UnsupportedKey(key.to_string())),
    }
    Ok(())
}

fn run_section(config: &mut FileConfig) -> &mut FileRunConfig {
    config.run.get_or_insert_with(Default::default)
}

fn patterned_section(config: &mut FileConfig) -> &mut FilePatternedConfig {
    config.patterned.get_or_insert_with(Default::default)
}

#[derive(Debug, thiserror::Error)]
enum SetError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Unsupported configuration key for --set: '{0}'")]
    UnsupportedKey(String),
}
