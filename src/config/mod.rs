// src/config/mod.rs

//! Solver configuration.
//!
//! Defaults are layered under an optional YAML file and `QREFINE_`-prefixed
//! environment variables:
//!
//! 1. Programmatic defaults (`SolverConfig::default()`)
//! 2. YAML file passed to [`SolverConfig::load`], if any
//! 3. Environment variables such as `QREFINE_MAX_ITERATIONS=8`

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::{
    RefineError, CONVERGENCE_THRESHOLD, CONVERGENCE_WINDOW, DEFAULT_DIMENSION, DEFAULT_MAX_ITERATIONS,
    STABILITY_THRESHOLD, STABILITY_WINDOW,
};
use crate::prompts::Domain;

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "QREFINE_";

/// Tunables of the reflection loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Dimension D of encoded states.
    pub dimension: usize,
    /// Iteration budget per `solve` call.
    pub max_iterations: usize,
    /// Fidelity above which states count as converged.
    pub convergence_threshold: f64,
    /// Capacity W of the stability window; W consecutive stable checks stop the loop.
    pub stability_window: usize,
    /// Instability (and fidelity spread) below which texts count as unchanged.
    pub stability_threshold: f64,
    /// Trailing convergence entries inspected after each step.
    pub convergence_window: usize,
    /// Temperature of the initial solution call.
    pub initial_temperature: f64,
    /// Whether the initial call samples.
    pub initial_sampling: bool,
    /// Temperature of step refinement calls.
    pub refine_temperature: f64,
    /// Whether refinement calls sample.
    pub refine_sampling: bool,
    /// Per-call oracle timeout in milliseconds.
    pub oracle_timeout_ms: u64,
    /// Feed improved steps into the next iteration instead of re-refining
    /// the steps extracted from the initial response.
    pub carry_forward: bool,
    /// Optional domain guidance for the prompts.
    pub domain: Option<Domain>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_threshold: CONVERGENCE_THRESHOLD,
            stability_window: STABILITY_WINDOW,
            stability_threshold: STABILITY_THRESHOLD,
            convergence_window: CONVERGENCE_WINDOW,
            initial_temperature: 0.1,
            initial_sampling: true,
            refine_temperature: 0.7,
            refine_sampling: true,
            oracle_timeout_ms: 120_000,
            carry_forward: true,
            domain: None,
        }
    }
}

impl SolverConfig {
    /// Loads defaults, then `path` (YAML) if given, then environment overrides,
    /// and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, RefineError> {
        let mut figment = Figment::new().merge(Serialized::defaults(SolverConfig::default()));
        if let Some(p) = path {
            figment = figment.merge(Yaml::file(p));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Parses YAML text layered over the defaults (no environment lookup).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RefineError> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(SolverConfig::default()))
                .merge(Yaml::string(yaml)),
        )
    }

    fn extract(figment: Figment) -> Result<Self, RefineError> {
        let config: SolverConfig = figment.extract().map_err(|e| RefineError::InvalidConfig {
            message: format!("failed to extract configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Timeout applied to each oracle call.
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    /// Checks every field for range errors.
    pub fn validate(&self) -> Result<(), RefineError> {
        let invalid = |message: String| Err(RefineError::InvalidConfig { message });

        if self.dimension == 0 {
            return invalid("dimension must be at least 1".to_string());
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".to_string());
        }
        if self.stability_window == 0 {
            return invalid("stability_window must be at least 1".to_string());
        }
        if self.convergence_window == 0 {
            return invalid("convergence_window must be at least 1".to_string());
        }
        if !(self.convergence_threshold > 0.0 && self.convergence_threshold <= 1.0) {
            return invalid(format!(
                "convergence_threshold {} must lie in (0, 1]",
                self.convergence_threshold
            ));
        }
        if !(self.stability_threshold > 0.0 && self.stability_threshold <= 1.0) {
            return invalid(format!("stability_threshold {} must lie in (0, 1]", self.stability_threshold));
        }
        for (name, value) in [
            ("initial_temperature", self.initial_temperature),
            ("refine_temperature", self.refine_temperature),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{} {} must be a non-negative number", name, value));
            }
        }
        if self.oracle_timeout_ms == 0 {
            return invalid("oracle_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}
