use crate::error::{CliError, Result};
use kmcthinfilm::core::rng::RngKind;
use kmcthinfilm::engine::config::{SolverId, TrackingMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRunConfig {
    pub flux: Option<f64>,
    pub max_coverage: Option<f64>,
    pub domain_size: Option<i32>,
    pub seed: Option<u64>,
    pub solver: Option<SolverId>,
    pub rng: Option<RngKind>,
    pub tracking: Option<TrackingMode>,
    pub snapshot_fraction: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileOutputConfig {
    pub dir: Option<PathBuf>,
    pub file_root: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBallisticConfig {
    pub mix_rate_factor: Option<f64>,
    pub planes_to_reserve: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileFractalConfig {
    pub d_over_f: Option<f64>,
    pub relax_fraction: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePatternedConfig {
    pub temperature: Option<f64>,
    pub e_n: Option<f64>,
    pub e_edge: Option<f64>,
    pub e_mid: Option<f64>,
    pub half_width: Option<usize>,
    pub pattern_file: Option<PathBuf>,
    pub relax_fraction: Option<f64>,
}

/// One configuration file may hold the sections of every model; each run
/// reads `run`, `output` and its own model section.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub run: Option<FileRunConfig>,
    pub output: Option<FileOutputConfig>,
    pub ballistic: Option<FileBallisticConfig>,
    pub fractal: Option<FileFractalConfig>,
    pub patterned: Option<FilePatternedConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_case_sections_are_read() {
        let config: FileConfig = toml::from_str(
            r#"
            [run]
            max-coverage = 2.5
            solver = "binary-tree"
            tracking = "semi-manual"

            [output]
            file-root = "film"

            [fractal]
            d-over-f = 1e4
            "#,
        )
        .unwrap();

        let run = config.run.unwrap();
        assert_eq!(run.max_coverage, Some(2.5));
        assert_eq!(run.solver, Some(SolverId::BinaryTree));
        assert_eq!(run.tracking, Some(TrackingMode::SemiManual));
        assert_eq!(config.output.unwrap().file_root.as_deref(), Some("film"));
        assert_eq!(config.fractal.unwrap().d_over_f, Some(1e4));
        assert!(config.ballistic.is_none());
    }

    #[test]
    fn patterned_section_is_read() {
        let config: FileConfig = toml::from_str(
            r#"
            [patterned]
            temperature = 420.0
            e-n = 0.2
            pattern-file = "tiles/single.dat"
            "#,
        )
        .unwrap();

        let patterned = config.patterned.unwrap();
        assert_eq!(patterned.temperature, Some(420.0));
        assert_eq!(patterned.e_n, Some(0.2));
        assert_eq!(patterned.pattern_file, Some(PathBuf::from("tiles/single.dat")));
        assert!(patterned.half_width.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<FileConfig, _> = toml::from_str("[run]\nfluxx = 1.0\n");
        assert!(result.is_err());
    }

    #[test]
    fn unreadable_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[run\n").unwrap();

        let err = FileConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { ref path, .. } if path.ends_with("bad.toml")));
    }
}
