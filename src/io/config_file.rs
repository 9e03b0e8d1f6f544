//! Read/write estimator configuration files.
//!
//! Two shapes are accepted by `--config`:
//! - a bare `EstimatorConfig` (any subset of fields; the rest default)
//! - a calibration file written by `calibrate --export-config` or
//!   `fit --export-config`, whose `config` field holds the estimator config
//!
//! A file is treated as a calibration file when it has both `tool` and
//! `config` keys at the top level.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::EstimatorConfig;
use crate::error::AppError;

pub const TOOL_NAME: &str = "reimburse";

/// Provenance + result of a calibration or baseline fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub tool: String,
    /// Subcommand that produced the file (`calibrate` or `fit`).
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub n_records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folds: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Mean absolute error of the exported config on all records.
    pub train_mae: f64,
    /// Honest out-of-fold error, when nested CV ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_mae: Option<f64>,
    pub config: EstimatorConfig,
}

impl CalibrationFile {
    pub fn new(source: &str, n_records: usize, train_mae: f64, config: EstimatorConfig) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            source: source.to_string(),
            generated_at: Utc::now(),
            n_records,
            folds: None,
            seed: None,
            train_mae,
            cv_mae: None,
            config,
        }
    }
}

/// What a `--config` file turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedConfig {
    Plain(EstimatorConfig),
    Calibration(Box<CalibrationFile>),
}

impl LoadedConfig {
    pub fn into_config(self) -> EstimatorConfig {
        match self {
            LoadedConfig::Plain(c) => c,
            LoadedConfig::Calibration(f) => f.config,
        }
    }
}

/// Read a `--config` file and validate the configuration inside it.
pub fn read_config_file(path: &Path) -> Result<LoadedConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::usage(format!("Failed to open config '{}': {e}", path.display())))?;
    let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::usage(format!("Invalid config JSON '{}': {e}", path.display())))?;
    let loaded = parse_config_value(value)?;

    match &loaded {
        LoadedConfig::Plain(c) => c.validate()?,
        LoadedConfig::Calibration(f) => f.config.validate()?,
    }
    Ok(loaded)
}

fn parse_config_value(value: serde_json::Value) -> Result<LoadedConfig, AppError> {
    let is_calibration = value
        .as_object()
        .is_some_and(|o| o.contains_key("tool") && o.contains_key("config"));

    if is_calibration {
        let file: CalibrationFile = serde_json::from_value(value)
            .map_err(|e| AppError::usage(format!("Invalid calibration file: {e}")))?;
        Ok(LoadedConfig::Calibration(Box::new(file)))
    } else {
        let config: EstimatorConfig = serde_json::from_value(value)
            .map_err(|e| AppError::usage(format!("Invalid estimator config: {e}")))?;
        Ok(LoadedConfig::Plain(config))
    }
}

/// Write a calibration file (pretty JSON).
pub fn write_calibration_file(path: &Path, file: &CalibrationFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::usage(format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::usage(format!("Failed to write calibration file: {e}")))
}

/// Pretty JSON for one config (used by `presets`).
pub fn config_to_json(config: &EstimatorConfig) -> Result<String, AppError> {
    serde_json::to_string_pretty(config)
        .map_err(|e| AppError::internal(format!("Failed to serialize config: {e}")))
}
