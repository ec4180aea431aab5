use kmcthinfilm::engine::config::{BallisticConfig, FractalConfig, PatternedConfig, RunConfig};
use kmcthinfilm::workflows::SUMMARY_FILE;
use std::path::{Path, PathBuf};

/// A fully merged run configuration, ready for its workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum AppConfig {
    Ballistic(BallisticConfig),
    Fractal(FractalConfig),
    Patterned(PatternedConfig),
}

impl AppConfig {
    pub fn name(&self) -> &'static str {
        match self {
            AppConfig::Ballistic(_) => "ballistic",
            AppConfig::Fractal(_) => "fractal",
            AppConfig::Patterned(_) => "patterned",
        }
    }

    pub fn run(&self) -> &RunConfig {
        match self {
            AppConfig::Ballistic(config) => &config.run,
            AppConfig::Fractal(config) => &config.run,
            AppConfig::Patterned(config) => &config.run,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.run().output_dir
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir().join(SUMMARY_FILE)
    }
}
