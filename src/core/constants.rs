//! Numeric constants and solver defaults.

/// Constants shared by the encoder, the dynamics and the controller.
pub mod refine_constants {
    /// Used for phase angles (`e^(iθ)`)
    pub const PI: f64 = std::f64::consts::PI;
    /// Default dimension D of the state space.
    pub const DEFAULT_DIMENSION: usize = 512;
    /// Default iteration budget for one `solve` call.
    pub const DEFAULT_MAX_ITERATIONS: usize = 5;
    /// Fidelity above which refinement is considered converged.
    pub const CONVERGENCE_THRESHOLD: f64 = 0.98;
    /// Capacity W of the stability window.
    pub const STABILITY_WINDOW: usize = 3;
    /// Maximum tolerated instability (and fidelity spread) for a stable judgement.
    pub const STABILITY_THRESHOLD: f64 = 0.001;
    /// Number of trailing convergence entries inspected per step.
    pub const CONVERGENCE_WINDOW: usize = 3;
    /// Tolerance used when checking unit norm, hermiticity and unitarity.
    pub const NORM_TOLERANCE: f64 = 1e-9;
}
