use crate::core::rng::RngKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Parameter {0} is not available.")]
    SchemeParamUnavailable(SchemeParam),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverId {
    #[default]
    DynamicSchulze,
    BinaryTree,
}

impl fmt::Display for SolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverId::DynamicSchulze => write!(f, "dynamic-schulze"),
            SolverId::BinaryTree => write!(f, "binary-tree"),
        }
    }
}

/// How the global clock of a parallel simulation is advanced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SchemeName {
    #[default]
    BadValue,
    MaxAvgPropensityPerPossEvent,
    MaxSinglePropensity,
    FixedValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemeParam {
    Nstop,
    TstopMax,
    Tstop,
}

impl fmt::Display for SchemeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeParam::Nstop => write!(f, "NSTOP"),
            SchemeParam::TstopMax => write!(f, "TSTOP_MAX"),
            SchemeParam::Tstop => write!(f, "TSTOP"),
        }
    }
}

/// Name and parameters of a time-incrementing scheme.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeIncrSchemeVars {
    name: SchemeName,
    params: BTreeMap<SchemeParam, f64>,
}

impl TimeIncrSchemeVars {
    pub fn new(name: SchemeName) -> Self {
        Self {
            name,
            params: BTreeMap::new(),
        }
    }

    pub fn set_scheme_name(&mut self, name: SchemeName) {
        self.name = name;
    }

    pub fn set_scheme_param(&mut self, param: SchemeParam, val: f64) {
        self.params.insert(param, val);
    }

    pub fn scheme_name(&self) -> SchemeName {
        self.name
    }

    pub fn get_scheme_param_if_available(&self, param: SchemeParam) -> Option<f64> {
        self.params.get(&param).copied()
    }

    pub fn get_scheme_param_or_die(&self, param: SchemeParam) -> Result<f64, ConfigError> {
        self.get_scheme_param_if_available(param)
            .ok_or(ConfigError::SchemeParamUnavailable(param))
    }

    pub fn get_scheme_param_or_return_default_val(&self, param: SchemeParam, default: f64) -> f64 {
        self.get_scheme_param_if_available(param).unwrap_or(default)
    }
}

/// Parameters shared by every bundled growth model.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub flux: f64,
    pub max_coverage: f64,
    pub domain_size: i32,
    pub seed: u64,
    pub solver: SolverId,
    pub rng: RngKind,
    pub snapshot_fraction: f64,
    pub output_dir: PathBuf,
    pub file_root: String,
}

impl RunConfig {
    /// Time needed to deposit `max_coverage` monolayers at the given flux.
    pub fn deposition_time(&self) -> f64 {
        self.max_coverage / self.flux
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BallisticConfig {
    pub run: RunConfig,
    pub mix_rate_factor: f64,
    pub planes_to_reserve: usize,
    pub tracking: TrackingMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingMode {
    #[default]
    Auto,
    SemiManual,
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingMode::Auto => write!(f, "auto"),
            TrackingMode::SemiManual => write!(f, "semi-manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FractalConfig {
    pub run: RunConfig,
    pub d_over_f: f64,
    pub relax_fraction: f64,
    pub tracking: TrackingMode,
}

/// Where the substrate energy pattern of the patterned model comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SubstrateSource {
    /// One square domain of side `2 * half_width` whose energy rises linearly
    /// from `e_edge` on its border to `e_mid` in its middle.
    Ramp {
        e_edge: f64,
        e_mid: f64,
        half_width: usize,
    },
    /// A text file with an `ni nj` header line followed by `i j E_s` lines.
    File(PathBuf),
}

impl Default for SubstrateSource {
    fn default() -> Self {
        SubstrateSource::Ramp {
            e_edge: 0.65,
            e_mid: 0.85,
            half_width: 11,
        }
    }
}

/// Surface diffusion over a substrate with a periodic energy pattern.
///
/// Energies are in eV and the temperature in K.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternedConfig {
    pub run: RunConfig,
    /// Bond energy added per lateral neighbor at least as tall as the hopping column.
    pub e_n: f64,
    pub temperature: f64,
    pub substrate: SubstrateSource,
    pub relax_fraction: f64,
    pub tracking: TrackingMode,
}

#[derive(Default)]
struct RunConfigBuilder {
    flux: Option<f64>,
    max_coverage: Option<f64>,
    domain_size: Option<i32>,
    seed: Option<u64>,
    solver: Option<SolverId>,
    rng: Option<RngKind>,
    snapshot_fraction: Option<f64>,
    output_dir: Option<PathBuf>,
    file_root: Option<String>,
}

fn non_negative(name: &'static str, val: f64) -> Result<f64, ConfigError> {
    if val >= 0.0 && val.is_finite() {
        Ok(val)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be non-negative, got {val}"),
        })
    }
}

fn positive(name: &'static str, val: f64) -> Result<f64, ConfigError> {
    if val > 0.0 && val.is_finite() {
        Ok(val)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("expected a positive finite number, got {val}"),
        })
    }
}

impl RunConfigBuilder {
    fn build(self) -> Result<RunConfig, ConfigError> {
        let domain_size = self
            .domain_size
            .ok_or(ConfigError::MissingParameter("domain_size"))?;
        if domain_size <= 0 {
            return Err(ConfigError::InvalidParameter {
                name: "domain_size",
                reason: format!("must be positive, got {domain_size}"),
            });
        }
        Ok(RunConfig {
            flux: positive(
                "flux",
                self.flux.ok_or(ConfigError::MissingParameter("flux"))?,
            )?,
            max_coverage: positive(
                "max_coverage",
                self.max_coverage
                    .ok_or(ConfigError::MissingParameter("max_coverage"))?,
            )?,
            domain_size,
            seed: self.seed.ok_or(ConfigError::MissingParameter("seed"))?,
            solver: self.solver.unwrap_or_default(),
            rng: self.rng.unwrap_or_default(),
            snapshot_fraction: positive("snapshot_fraction", self.snapshot_fraction.unwrap_or(0.05))?,
            output_dir: self
                .output_dir
                .ok_or(ConfigError::MissingParameter("output_dir"))?,
            file_root: self.file_root.unwrap_or_else(|| "snapshot".to_string()),
        })
    }
}

macro_rules! run_setters {
    () => {
        pub fn flux(mut self, flux: f64) -> Self {
            self.run.flux = Some(flux);
            self
        }
        pub fn max_coverage(mut self, coverage: f64) -> Self {
            self.run.max_coverage = Some(coverage);
            self
        }
        pub fn domain_size(mut self, size: i32) -> Self {
            self.run.domain_size = Some(size);
            self
        }
        pub fn seed(mut self, seed: u64) -> Self {
            self.run.seed = Some(seed);
            self
        }
        pub fn solver(mut self, solver: SolverId) -> Self {
            self.run.solver = Some(solver);
            self
        }
        pub fn rng(mut self, rng: RngKind) -> Self {
            self.run.rng = Some(rng);
            self
        }
        pub fn snapshot_fraction(mut self, fraction: f64) -> Self {
            self.run.snapshot_fraction = Some(fraction);
            self
        }
        pub fn output_dir(mut self, dir: PathBuf) -> Self {
            self.run.output_dir = Some(dir);
            self
        }
        pub fn file_root(mut self, root: impl Into<String>) -> Self {
            self.run.file_root = Some(root.into());
            self
        }
    };
}

#[derive(Default)]
pub struct BallisticConfigBuilder {
    run: RunConfigBuilder,
    mix_rate_factor: Option<f64>,
    planes_to_reserve: Option<usize>,
    tracking: Option<TrackingMode>,
}

impl BallisticConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    run_setters!();

    pub fn mix_rate_factor(mut self, factor: f64) -> Self {
        self.mix_rate_factor = Some(factor);
        self
    }
    pub fn planes_to_reserve(mut self, planes: usize) -> Self {
        self.planes_to_reserve = Some(planes);
        self
    }
    pub fn tracking(mut self, mode: TrackingMode) -> Self {
        self.tracking = Some(mode);
        self
    }

    pub fn build(self) -> Result<BallisticConfig, ConfigError> {
        let mix_rate_factor = self.mix_rate_factor.unwrap_or(10.0);
        if mix_rate_factor < 0.0 || !mix_rate_factor.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "mix_rate_factor",
                reason: format!("must be non-negative, got {mix_rate_factor}"),
            });
        }
        Ok(BallisticConfig {
            run: self.run.build()?,
            mix_rate_factor,
            planes_to_reserve: self.planes_to_reserve.unwrap_or(100),
            tracking: self.tracking.unwrap_or_default(),
        })
    }
}

#[derive(Default)]
pub struct FractalConfigBuilder {
    run: RunConfigBuilder,
    d_over_f: Option<f64>,
    relax_fraction: Option<f64>,
    tracking: Option<TrackingMode>,
}

impl FractalConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    run_setters!();

    pub fn d_over_f(mut self, ratio: f64) -> Self {
        self.d_over_f = Some(ratio);
        self
    }
    pub fn relax_fraction(mut self, fraction: f64) -> Self {
        self.relax_fraction = Some(fraction);
        self
    }
    pub fn tracking(mut self, mode: TrackingMode) -> Self {
        self.tracking = Some(mode);
        self
    }

    pub fn build(self) -> Result<FractalConfig, ConfigError> {
        let relax_fraction = self.relax_fraction.unwrap_or(0.1);
        if relax_fraction < 0.0 || !relax_fraction.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "relax_fraction",
                reason: format!("must be non-negative, got {relax_fraction}"),
            });
        }
        Ok(FractalConfig {
            run: self.run.build()?,
            d_over_f: positive(
                "d_over_f",
                self.d_over_f.ok_or(ConfigError::MissingParameter("d_over_f"))?,
            )?,
            relax_fraction,
            tracking: self.tracking.unwrap_or_default(),
        })
    }
}

#[derive(Default)]
pub struct PatternedConfigBuilder {
    run: RunConfigBuilder,
    e_n: Option<f64>,
    temperature: Option<f64>,
    substrate: Option<SubstrateSource>,
    relax_fraction: Option<f64>,
    tracking: Option<TrackingMode>,
}

impl PatternedConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    run_setters!();

    pub fn e_n(mut self, energy: f64) -> Self {
        self.e_n = Some(energy);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn substrate(mut self, source: SubstrateSource) -> Self {
        self.substrate = Some(source);
        self
    }
    pub fn relax_fraction(mut self, fraction: f64) -> Self {
        self.relax_fraction = Some(fraction);
        self
    }
    pub fn tracking(mut self, mode: TrackingMode) -> Self {
        self.tracking = Some(mode);
        self
    }

    pub fn build(self) -> Result<PatternedConfig, ConfigError> {
        let substrate = self.substrate.unwrap_or_default();
        if let SubstrateSource::Ramp {
            e_edge,
            e_mid,
            half_width,
        } = substrate
        {
            non_negative("e_edge", e_edge)?;
            non_negative("e_mid", e_mid)?;
            if half_width < 2 {
                return Err(ConfigError::InvalidParameter {
                    name: "half_width",
                    reason: format!("the ramp needs at least 2 values, got {half_width}"),
                });
            }
        }
        Ok(PatternedConfig {
            run: self.run.build()?,
            e_n: non_negative("e_n", self.e_n.unwrap_or(0.18))?,
            temperature: positive("temperature", self.temperature.unwrap_or(390.0))?,
            substrate,
            relax_fraction: non_negative("relax_fraction", self.relax_fraction.unwrap_or(0.1))?,
            tracking: self.tracking.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod scheme_vars {
        use super::*;

        #[test]
        fn missing_param_reports_its_name() {
            let vars = TimeIncrSchemeVars::new(SchemeName::FixedValue);
            let err = vars.get_scheme_param_or_die(SchemeParam::Tstop).unwrap_err();
            assert_eq!(err.to_string(), "Parameter TSTOP is not available.");
            assert_eq!(
                vars.get_scheme_param_or_return_default_val(SchemeParam::Tstop, 0.5),
                0.5
            );
        }

        #[test]
        fn set_params_are_returned() {
            let mut vars = TimeIncrSchemeVars::default();
            assert_eq!(vars.scheme_name(), SchemeName::BadValue);
            vars.set_scheme_name(SchemeName::MaxSinglePropensity);
            vars.set_scheme_param(SchemeParam::Nstop, 2.0);
            assert_eq!(vars.scheme_name(), SchemeName::MaxSinglePropensity);
            assert_eq!(vars.get_scheme_param_if_available(SchemeParam::Nstop), Some(2.0));
            assert_eq!(vars.get_scheme_param_or_die(SchemeParam::Nstop), Ok(2.0));
        }
    }

    mod builders {
        use super::*;

        fn fractal() -> FractalConfigBuilder {
            FractalConfigBuilder::new()
                .flux(1.0)
                .max_coverage(2.0)
                .domain_size(16)
                .seed(42)
                .output_dir(PathBuf::from("out"))
        }

        #[test]
        fn missing_d_over_f_is_reported() {
            assert_eq!(
                fractal().build(),
                Err(ConfigError::MissingParameter("d_over_f"))
            );
        }

        #[test]
        fn defaults_are_filled_in() {
            let config = fractal().d_over_f(1e3).build().unwrap();
            assert_eq!(config.relax_fraction, 0.1);
            assert_eq!(config.tracking, TrackingMode::Auto);
            assert_eq!(config.run.solver, SolverId::DynamicSchulze);
            assert_eq!(config.run.file_root, "snapshot");
            assert_eq!(config.run.deposition_time(), 2.0);
        }

        #[test]
        fn non_positive_flux_is_rejected() {
            let err = fractal().d_over_f(1.0).flux(0.0).build().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidParameter { name: "flux", .. }));
        }

        #[test]
        fn ballistic_defaults_match_reference_model() {
            let config = BallisticConfigBuilder::new()
                .flux(1.0)
                .max_coverage(4.0)
                .domain_size(100)
                .seed(42)
                .output_dir(PathBuf::from("out"))
                .build()
                .unwrap();
            assert_eq!(config.mix_rate_factor, 10.0);
            assert_eq!(config.planes_to_reserve, 100);
            assert_eq!(config.run.snapshot_fraction, 0.05);
        }

        fn patterned() -> PatternedConfigBuilder {
            PatternedConfigBuilder::new()
                .flux(0.0033)
                .max_coverage(0.15)
                .domain_size(352)
                .seed(42)
                .output_dir(PathBuf::from("out"))
        }

        #[test]
        fn patterned_defaults_describe_the_ramp_substrate() {
            let config = patterned().build().unwrap();
            assert_eq!(config.e_n, 0.18);
            assert_eq!(config.temperature, 390.0);
            assert_eq!(config.relax_fraction, 0.1);
            assert_eq!(
                config.substrate,
                SubstrateSource::Ramp {
                    e_edge: 0.65,
                    e_mid: 0.85,
                    half_width: 11
                }
            );
        }

        #[test]
        fn patterned_rejects_degenerate_ramps_and_temperatures() {
            let err = patterned()
                .substrate(SubstrateSource::Ramp {
                    e_edge: 0.6,
                    e_mid: 0.8,
                    half_width: 1,
                })
                .build()
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidParameter { name: "half_width", .. }));

            let err = patterned().temperature(0.0).build().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidParameter { name: "temperature", .. }));

            let err = patterned().e_n(-0.1).build().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidParameter { name: "e_n", .. }));
        }

        #[test]
        fn solver_ids_parse_from_kebab_case() {
            #[derive(Deserialize)]
            struct Wrapper {
                solver: SolverId,
            }
            let w: Wrapper = toml::from_str("solver = \"binary-tree\"").unwrap();
            assert_eq!(w.solver, SolverId::BinaryTree);
        }
    }
}
