use crate::cli::ModelKind;
use kmcthinfilm::core::rng::RngKind;
use kmcthinfilm::engine::config::{SolverId, TrackingMode};
use std::path::PathBuf;

pub struct DefaultsConfig {
    pub flux: f64,
    pub max_coverage: f64,
    pub domain_size: i32,
    pub seed: u64,
    pub solver: SolverId,
    pub rng: RngKind,
    pub tracking: TrackingMode,
    pub snapshot_fraction: f64,
    pub output_dir: PathBuf,
    pub file_root: String,
    pub mix_rate_factor: f64,
    pub planes_to_reserve: usize,
    pub d_over_f: f64,
    pub relax_fraction: f64,
    pub temperature: f64,
    pub e_n: f64,
    pub e_edge: f64,
    pub e_mid: f64,
    pub half_width: usize,
}

impl DefaultsConfig {
    pub fn for_model(model: ModelKind) -> Self {
        let base = Self::default();
        match model {
            ModelKind::Ballistic => Self {
                domain_size: 100,
                output_dir: PathBuf::from("ballistic-output"),
                ..base
            },
            ModelKind::Fractal => Self {
                domain_size: 256,
                output_dir: PathBuf::from("fractal-output"),
                ..base
            },
            // 16 x 16 tiles of the default 22 x 22 ramp.
            ModelKind::Patterned => Self {
                flux: 0.0033,
                max_coverage: 0.15,
                domain_size: 352,
                output_dir: PathBuf::from("patterned-output"),
                ..base
            },
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            flux: 1.0,
            max_coverage: 4.0,
            domain_size: 100,
            seed: 42,
            solver: SolverId::DynamicSchulze,
            rng: RngKind::Standard,
            tracking: TrackingMode::Auto,
            snapshot_fraction: 0.05,
            output_dir: PathBuf::from("output"),
            file_root: "snapshot".to_string(),
            mix_rate_factor: 10.0,
            planes_to_reserve: 100,
            d_over_f: 1e5,
            relax_fraction: 0.1,
            temperature: 390.0,
            e_n: 0.18,
            e_edge: 0.65,
            e_mid: 0.85,
            half_width: 11,
        }
    }
}

/// An annotated configuration file holding the defaults of `model`.
pub fn template(model: ModelKind) -> String {
    let d = DefaultsConfig::for_model(model);
    let mut out = format!(
        r#"# kmctf configuration file.
# Values given on the command line take precedence over this file.

[run]
# Deposition flux, in monolayers per unit time.
flux = {flux:?}
# Deposition stops once this many monolayers have been deposited.
max-coverage = {max_coverage:?}
# Side length of the square lattice, in cells.
domain-size = {domain_size}
seed = {seed}
# "dynamic-schulze" or "binary-tree"
solver = "{solver}"
# "standard" or "chacha-stream"
rng = "{rng}"
# "auto" records every write; "semi-manual" lets events declare the cells they change.
tracking = "{tracking}"
# Fraction of the deposition time between two snapshots.
snapshot-fraction = {snapshot_fraction:?}

[output]
dir = "{output_dir}"
file-root = "{file_root}"
"#,
        flux = d.flux,
        max_coverage = d.max_coverage,
        domain_size = d.domain_size,
        seed = d.seed,
        solver = d.solver,
        rng = d.rng,
        tracking = d.tracking,
        snapshot_fraction = d.snapshot_fraction,
        output_dir = d.output_dir.display(),
        file_root = d.file_root,
    );
    match model {
        ModelKind::Ballistic => out.push_str(&format!(
            r#"
[ballistic]
# Mixing rate per touching neighbor, in units of the flux.
mix-rate-factor = {:?}
planes-to-reserve = {}
"#,
            d.mix_rate_factor, d.planes_to_reserve
        )),
        ModelKind::Fractal => out.push_str(&format!(
            r#"
[fractal]
# Hop rate over deposition flux.
d-over-f = {:?}
# Relaxation after deposition, as a fraction of the deposition time.
relax-fraction = {:?}
"#,
            d.d_over_f, d.relax_fraction
        )),
        ModelKind::Patterned => out.push_str(&format!(
            r#"
[patterned]
# Substrate temperature, in K.
temperature = {:?}
# Bond energy per lateral neighbor at least as tall, in eV.
e-n = {:?}
# Generated tile: substrate energy ramps from e-edge on its border to e-mid in its middle.
e-edge = {:?}
e-mid = {:?}
half-width = {}
# Read the tile from an "ni nj" / "i j E_s" file instead.
# pattern-file = "substrate.dat"
# Relaxation after deposition, as a fraction of the deposition time.
relax-fraction = {:?}
"#,
            d.temperature, d.e_n, d.e_edge, d.e_mid, d.half_width, d.relax_fraction
        )),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::FileConfig;

    #[test]
    fn templates_parse_back_to_their_defaults() {
        for model in [ModelKind::Ballistic, ModelKind::Fractal, ModelKind::Patterned] {
            let d = DefaultsConfig::for_model(model);
            let parsed: FileConfig = toml::from_str(&template(model)).unwrap();

            let run = parsed.run.unwrap();
            assert_eq!(run.flux, Some(d.flux));
            assert_eq!(run.domain_size, Some(d.domain_size));
            assert_eq!(run.solver, Some(d.solver));
            assert_eq!(run.tracking, Some(d.tracking));
            assert_eq!(parsed.output.unwrap().dir, Some(d.output_dir));
            assert_eq!(parsed.ballistic.is_some(), model == ModelKind::Ballistic);
            assert_eq!(parsed.fractal.is_some(), model == ModelKind::Fractal);
            assert_eq!(parsed.patterned.is_some(), model == ModelKind::Patterned);
        }
    }

    #[test]
    fn patterned_template_carries_the_ramp_and_no_file() {
        let parsed: FileConfig = toml::from_str(&template(ModelKind::Patterned)).unwrap();
        let patterned = parsed.patterned.unwrap();
        assert_eq!(patterned.half_width, Some(11));
        assert_eq!(patterned.e_edge, Some(0.65));
        assert!(patterned.pattern_file.is_none());
        assert_eq!(parsed.run.unwrap().domain_size, Some(352));
    }

    #[test]
    fn fractal_uses_a_larger_domain() {
        assert_eq!(DefaultsConfig::for_model(ModelKind::Ballistic).domain_size, 100);
        assert_eq!(DefaultsConfig::for_model(ModelKind::Fractal).domain_size, 256);
    }
}
