use kmcthinfilm::core::rng::RngKind;
use kmcthinfilm::engine::config::{SolverId, TrackingMode};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown {kind} '{value}'. Expected one of: {expected}.")]
    UnknownName {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid override format: '{0}'. Expected KEY=VALUE.")]
    InvalidOverride(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

pub fn parse_solver(name: &str) -> Result<SolverId, ParseError> {
    match normalize(name).as_str() {
        "dynamic-schulze" | "schulze" => Ok(SolverId::DynamicSchulze),
        "binary-tree" | "tree" => Ok(SolverId::BinaryTree),
        _ => Err(ParseError::UnknownName {
            kind: "solver",
            value: name.to_string(),
            expected: "dynamic-schulze, binary-tree",
        }),
    }
}

pub fn parse_rng(name: &str) -> Result<RngKind, ParseError> {
    match normalize(name).as_str() {
        "standard" => Ok(RngKind::Standard),
        "chacha-stream" | "chacha" => Ok(RngKind::ChachaStream),
        _ => Err(ParseError::UnknownName {
            kind: "random number generator",
            value: name.to_string(),
            expected: "standard, chacha-stream",
        }),
    }
}

pub fn parse_tracking(name: &str) -> Result<TrackingMode, ParseError> {
    match normalize(name).as_str() {
        "auto" => Ok(TrackingMode::Auto),
        "semi-manual" => Ok(TrackingMode::SemiManual),
        _ => Err(ParseError::UnknownName {
            kind: "tracking mode",
            value: name.to_string(),
            expected: "auto, semi-manual",
        }),
    }
}

/// Splits a `KEY=VALUE` override at the first `=`.
pub fn split_override(kv_pair: &str) -> Result<(&str, &str), ParseError> {
    kv_pair
        .split_once('=')
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| ParseError::InvalidOverride(kv_pair.to_string()))
}

/// Parses the value of an override with [`str::parse`].
pub fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
