use crate::utils::parser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use kmcthinfilm::core::rng::RngKind;
use kmcthinfilm::engine::config::{SolverId, TrackingMode};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "kmctf - run lattice kinetic Monte Carlo thin-film growth models from the command line.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to rebuild the event list.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one of the bundled growth models.
    Run(RunArgs),
    /// Write an annotated configuration template for a growth model.
    Template(TemplateArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub model: RunModel,
}

#[derive(Subcommand, Debug)]
pub enum RunModel {
    /// Ballistic deposition with color mixing between touching atoms.
    Ballistic(BallisticArgs),
    /// Fractal island growth by surface diffusion, followed by relaxation.
    Fractal(FractalArgs),
    /// Thermally activated diffusion over a substrate with a periodic energy pattern.
    Patterned(PatternedArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    Ballistic,
    Fractal,
    Patterned,
}

/// Arguments shared by every growth model.
#[derive(Args, Debug, Default)]
pub struct CommonRunArgs {
    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory receiving snapshots and the run summary.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Prefix of the numbered snapshot files.
    #[arg(long, value_name = "NAME")]
    pub file_root: Option<String>,

    // --- Physical parameters ---
    /// Deposition flux in monolayers per unit time.
    #[arg(short = 'F', long, value_name = "FLOAT")]
    pub flux: Option<f64>,

    /// Coverage, in monolayers, at which deposition stops.
    #[arg(long, value_name = "FLOAT")]
    pub max_coverage: Option<f64>,

    /// Lattice side length in cells.
    #[arg(short = 'L', long, value_name = "INT")]
    pub domain_size: Option<i32>,

    // --- Engine selection ---
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Event selection solver: 'dynamic-schulze' or 'binary-tree'.
    #[arg(long, value_name = "NAME", value_parser = parser::parse_solver)]
    pub solver: Option<SolverId>,

    /// Random number generator: 'standard' or 'chacha-stream'.
    #[arg(long, value_name = "NAME", value_parser = parser::parse_rng)]
    pub rng: Option<RngKind>,

    /// How events report the cells they change: 'auto' or 'semi-manual'.
    #[arg(long, value_name = "MODE", value_parser = parser::parse_tracking)]
    pub tracking: Option<TrackingMode>,

    /// Fraction of the deposition time between two snapshots.
    #[arg(long, value_name = "FLOAT")]
    pub snapshot_fraction: Option<f64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S run.seed=7
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for `run ballistic`.
#[derive(Args, Debug, Default)]
pub struct BallisticArgs {
    #[command(flatten)]
    pub common: CommonRunArgs,

    /// Mixing rate per touching neighbor, in units of the flux.
    #[arg(long, value_name = "FLOAT")]
    pub mix_rate_factor: Option<f64>,

    /// Lattice planes to allocate up front.
    #[arg(long, value_name = "INT")]
    pub planes_to_reserve: Option<usize>,
}

/// Arguments for `run fractal`.
#[derive(Args, Debug, Default)]
pub struct FractalArgs {
    #[command(flatten)]
    pub common: CommonRunArgs,

    /// Ratio of the hop rate to the deposition flux.
    #[arg(short = 'D', long, value_name = "FLOAT")]
    pub d_over_f: Option<f64>,

    /// Relaxation time after deposition, as a fraction of the deposition time.
    #[arg(long, value_name = "FLOAT")]
    pub relax_fraction: Option<f64>,
}

/// Arguments for `run patterned`.
#[derive(Args, Debug, Default)]
pub struct PatternedArgs {
    #[command(flatten)]
    pub common: CommonRunArgs,

    /// Substrate temperature in kelvin.
    #[arg(short = 'T', long, value_name = "FLOAT")]
    pub temperature: Option<f64>,

    /// Bond energy per lateral neighbor, in eV.
    #[arg(long, value_name = "FLOAT")]
    pub e_n: Option<f64>,

    /// Substrate energy on the border of each generated tile, in eV.
    #[arg(long, value_name = "FLOAT")]
    pub e_edge: Option<f64>,

    /// Substrate energy in the middle of each generated tile, in eV.
    #[arg(long, value_name = "FLOAT")]
    pub e_mid: Option<f64>,

    /// Half the side length of a generated tile, in cells.
    #[arg(long, value_name = "INT")]
    pub half_width: Option<usize>,

    /// Read the substrate tile from a file instead of generating it.
    #[arg(long, value_name = "PATH")]
    pub pattern_file: Option<PathBuf>,

    /// Relaxation time after deposition, as a fraction of the deposition time.
    #[arg(long, value_name = "FLOAT")]
    pub relax_fraction: Option<f64>,
}

/// Arguments for the `template` subcommand.
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Growth model to write a template for.
    #[arg(value_enum)]
    pub model: ModelKind,

    /// Output path. Prints to stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Overwrite the output file if it exists.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let cli = Cli::parse_from(["kmctf", "run", "fractal", "-vv", "-j", "4", "--seed", "3"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.threads, Some(4));
        let Commands::Run(RunArgs {
            model: RunModel::Fractal(args),
        }) = cli.command
        else {
            panic!("Expected 'run fractal' subcommand");
        };
        assert_eq!(args.common.seed, Some(3));
        assert!(args.d_over_f.is_none());
    }

    #[test]
    fn engine_names_are_parsed() {
        let cli = Cli::parse_from([
            "kmctf",
            "run",
            "ballistic",
            "--solver",
            "binary-tree",
            "--rng",
            "chacha-stream",
            "--tracking",
            "semi-manual",
            "-S",
            "run.flux=2",
            "-S",
            "ballistic.mix-rate-factor=3",
        ]);
        let Commands::Run(RunArgs {
            model: RunModel::Ballistic(args),
        }) = cli.command
        else {
            panic!("Expected 'run ballistic' subcommand");
        };
        assert_eq!(args.common.solver, Some(SolverId::BinaryTree));
        assert_eq!(args.common.rng, Some(RngKind::ChachaStream));
        assert_eq!(args.common.tracking, Some(TrackingMode::SemiManual));
        assert_eq!(args.common.set_values.len(), 2);
    }

    #[test]
    fn patterned_substrate_options_are_parsed() {
        let cli = Cli::parse_from([
            "kmctf",
            "run",
            "patterned",
            "-T",
            "450",
            "--e-n",
            "0.2",
            "--pattern-file",
            "tile.dat",
        ]);
        let Commands::Run(RunArgs {
            model: RunModel::Patterned(args),
        }) = cli.command
        else {
            panic!("Expected 'run patterned' subcommand");
        };
        assert_eq!(args.temperature, Some(450.0));
        assert_eq!(args.e_n, Some(0.2));
        assert_eq!(args.pattern_file, Some(PathBuf::from("tile.dat")));
        assert!(args.half_width.is_none());
    }

    #[test]
    fn unknown_solver_is_rejected() {
        let result = Cli::try_parse_from(["kmctf", "run", "fractal", "--solver", "quantum"]);
        assert!(result.is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["kmctf", "-q", "-v", "template", "fractal"]);
        assert!(result.is_err());
    }
}
