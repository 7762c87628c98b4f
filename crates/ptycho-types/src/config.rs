// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::CGRAD_SOLVER_NAME;
use crate::error::{PtychoError, PtychoResult};

/// Noise model of the measured intensities.
///
/// Parsed from `"poisson"` or `"gaussian"`; anything else is rejected
/// before a solver is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NoiseModel {
    #[default]
    Poisson,
    Gaussian,
}

impl NoiseModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseModel::Poisson => "poisson",
            NoiseModel::Gaussian => "gaussian",
        }
    }
}

impl FromStr for NoiseModel {
    type Err = PtychoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poisson" => Ok(NoiseModel::Poisson),
            "gaussian" => Ok(NoiseModel::Gaussian),
            other => Err(PtychoError::ConfigError(format!(
                "model must be 'gaussian' or 'poisson', got '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for NoiseModel {
    type Error = PtychoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoiseModel> for String {
    fn from(model: NoiseModel) -> Self {
        model.as_str().to_string()
    }
}

impl fmt::Display for NoiseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered reconstruction algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    #[default]
    ConjugateGradient,
}

impl Algorithm {
    pub const ALL: [Algorithm; 1] = [Algorithm::ConjugateGradient];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::ConjugateGradient => CGRAD_SOLVER_NAME,
        }
    }
}

/// Names of every registered solver.
pub fn available_solvers() -> Vec<&'static str> {
    Algorithm::ALL.iter().map(Algorithm::as_str).collect()
}

impl FromStr for Algorithm {
    type Err = PtychoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                PtychoError::ConfigError(format!(
                    "unknown algorithm '{s}', available: {:?}",
                    available_solvers()
                ))
            })
    }
}

impl TryFrom<String> for Algorithm {
    type Error = PtychoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Algorithm> for String {
    fn from(algorithm: Algorithm) -> Self {
        algorithm.as_str().to_string()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backtracking line-search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchConfig {
    /// First trial step length (default: 1.0).
    pub initial_step: f64,
    /// Factor applied after each rejected trial (default: 0.5).
    pub shrink: f64,
    /// Rejected trials allowed before the step is skipped (default: 100).
    pub max_backtracks: usize,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        LineSearchConfig {
            initial_step: 1.0,
            shrink: 0.5,
            max_backtracks: 100,
        }
    }
}

impl LineSearchConfig {
    pub fn validate(&self) -> PtychoResult<()> {
        if !self.initial_step.is_finite() || self.initial_step <= 0.0 {
            return Err(PtychoError::ConfigError(format!(
                "line_search.initial_step must be finite and > 0, got {}",
                self.initial_step
            )));
        }
        if !self.shrink.is_finite() || self.shrink <= 0.0 || self.shrink >= 1.0 {
            return Err(PtychoError::ConfigError(format!(
                "line_search.shrink must be in (0, 1), got {}",
                self.shrink
            )));
        }
        if self.max_backtracks == 0 {
            return Err(PtychoError::ConfigError(
                "line_search.max_backtracks must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for one reconstruction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub algorithm: Algorithm,
    pub model: NoiseModel,
    /// Conjugate-gradient steps per call.
    pub inner_iterations: usize,
    /// Weight of the ‖reg − psi‖² penalty. Must be >= 0.
    pub penalty_weight: f64,
    /// Co-optimize the probe after each object update.
    pub recover_probe: bool,
    pub line_search: LineSearchConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            algorithm: Algorithm::ConjugateGradient,
            model: NoiseModel::Poisson,
            inner_iterations: 1,
            penalty_weight: 0.0,
            recover_probe: false,
            line_search: LineSearchConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> PtychoResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON document.
    ///
    /// Unknown model or algorithm names are reported as configuration
    /// errors rather than syntax errors.
    pub fn from_json_str(json: &str) -> PtychoResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => PtychoError::ConfigError(e.to_string()),
            _ => PtychoError::Json(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PtychoResult<()> {
        if !self.penalty_weight.is_finite() || self.penalty_weight < 0.0 {
            return Err(PtychoError::ConfigError(format!(
                "penalty_weight must be finite and >= 0, got {}",
                self.penalty_weight
            )));
        }
        self.line_search.validate()
    }
}
