mod builder;
pub mod defaults;
pub mod file;
mod models;

pub use builder::{build_ballistic_config, build_fractal_config, build_patterned_config};
pub use models::AppConfig;
