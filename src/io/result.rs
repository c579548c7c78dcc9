//! Read/write inversion result JSON files.
//!
//! A result file is the portable record of one `sfh invert` run: the recovered SFH
//! with its internal uncertainties, the chi-square history, the configuration that
//! produced it and, when requested, the bootstrap statistics. `sfh report` renders
//! it again without rerunning anything.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ModellingParameters;
use crate::error::AppError;
use crate::invert::{BootstrapConfig, BootstrapSummary, Smoothing};
use crate::sfh::SfhModel;

/// Configuration recorded alongside a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub lf_path: PathBuf,
    /// Prior CSV, or `None` for a flat prior.
    pub prior_path: Option<PathBuf>,
    pub population_size: usize,
    pub seed: u64,
    pub smoothing: Smoothing,
    pub threshold: f64,
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub params: ModellingParameters,
    pub physics: String,
    pub bootstrap: Option<BootstrapConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    pub tool: String,
    pub generated: DateTime<Utc>,
    pub config: RunSummary,
    pub sfh: SfhModel,
    pub chi_square_history: Vec<f64>,
    pub iterations: usize,
    #[serde(default)]
    pub bootstrap: Option<BootstrapSummary>,
}

/// Write a result JSON file.
pub fn write_result_json(path: &Path, result: &ResultFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, result)
        .map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))?;
    Ok(())
}

/// Read a result JSON file.
pub fn read_result_json(path: &Path) -> Result<ResultFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open result JSON '{}': {e}", path.display())))?;
    let result: ResultFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid result JSON: {e}")))?;
    Ok(result)
}
