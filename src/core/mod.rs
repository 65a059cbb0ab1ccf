// src/core/mod.rs

//! Core data structures and types

pub mod error;
pub mod state;
pub mod constants;

// Re-export public types for convenient access via `qrefine::core::TypeName`
pub use error::{Component, OracleError, RefineError, SolveError};
pub use state::QuantumState;
pub use constants::refine_constants::{
    CONVERGENCE_THRESHOLD, CONVERGENCE_WINDOW, DEFAULT_DIMENSION, DEFAULT_MAX_ITERATIONS,
    NORM_TOLERANCE, PI, STABILITY_THRESHOLD, STABILITY_WINDOW,
};
