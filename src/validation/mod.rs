// src/validation/mod.rs

//! Invariant checks on states and operators, and the fidelity measures the
//! reflection loop uses to judge convergence.

use num_complex::Complex;

use crate::core::{QuantumState, RefineError, NORM_TOLERANCE};
use crate::dynamics::SquareMatrix;

// --- Fidelity ---

/// Fidelity `|<a|b>|²` between two unit-norm states, in `[0, 1]`.
///
/// Symmetric in its arguments. Rounding can push the raw value a hair past
/// 1.0, so the result is clamped.
///
/// # Returns
/// * `Err(RefineError::DimensionMismatch)` if the states differ in dimension.
pub fn fidelity(a: &QuantumState, b: &QuantumState) -> Result<f64, RefineError> {
    let overlap = a.inner_product(b)?;
    Ok(overlap.norm_sqr().clamp(0.0, 1.0))
}

/// Fidelity between two equally long runs of states.
///
/// Each run is treated as one concatenated vector scaled by `1/sqrt(N)`, so
/// the value is `|Σ_k <a_k|b_k>|² / N²` and stays in `[0, 1]`.
///
/// # Returns
/// * `Err(RefineError::DimensionMismatch)` if the runs differ in length or any
///   pair differs in dimension.
/// * `Ok(0.0)` for two empty runs.
pub fn aggregate_fidelity(a: &[QuantumState], b: &[QuantumState]) -> Result<f64, RefineError> {
    if a.len() != b.len() {
        return Err(RefineError::DimensionMismatch { expected: a.len(), found: b.len() });
    }
    if a.is_empty() {
        return Ok(0.0);
    }
    let mut overlap = Complex::new(0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        overlap += x.inner_product(y)?;
    }
    let n = a.len() as f64;
    Ok((overlap.norm_sqr() / (n * n)).clamp(0.0, 1.0))
}

// --- Public Validation Functions ---

/// Checks that the state vector is normalized (`Σ|c_i|² ≈ 1`).
///
/// # Arguments
/// * `state` - The `QuantumState` to check.
/// * `tolerance` - Allowed deviation from 1.0. Defaults to `NORM_TOLERANCE`.
///
/// # Returns
/// * `Ok(())` if normalized within tolerance.
/// * `Err(RefineError::Incoherence)` if normalization fails.
pub fn check_normalization(state: &QuantumState, tolerance: Option<f64>) -> Result<(), RefineError> {
    let effective_tolerance = tolerance.unwrap_or(NORM_TOLERANCE);
    let norm_sq: f64 = state.vector().iter().map(|c| c.norm_sqr()).sum();
    if (norm_sq - 1.0).abs() > effective_tolerance {
        Err(RefineError::Incoherence {
            message: format!("State vector normalization failed. Sum(|c_i|^2) = {} (Deviation > {})", norm_sq, effective_tolerance)
        })
    } else {
        Ok(())
    }
}

/// Checks `H ≈ H†` entry by entry.
pub fn check_hermitian(matrix: &SquareMatrix, tolerance: Option<f64>) -> Result<(), RefineError> {
    let effective_tolerance = tolerance.unwrap_or(NORM_TOLERANCE);
    let deviation = matrix.max_abs_diff(&matrix.conjugate_transpose());
    if deviation > effective_tolerance {
        Err(RefineError::Incoherence {
            message: format!("Operator is not Hermitian. max|H - H†| = {:.3e} (> {})", deviation, effective_tolerance)
        })
    } else {
        Ok(())
    }
}

/// Checks `U† U ≈ I`.
pub fn check_unitary(matrix: &SquareMatrix, tolerance: Option<f64>) -> Result<(), RefineError> {
    let effective_tolerance = tolerance.unwrap_or(NORM_TOLERANCE);
    let product = matrix.conjugate_transpose().mul(matrix);
    let deviation = product.max_abs_diff(&SquareMatrix::identity(matrix.dim()));
    if deviation > effective_tolerance {
        Err(RefineError::Incoherence {
            message: format!("Operator is not unitary. max|U†U - I| = {:.3e} (> {})", deviation, effective_tolerance)
        })
    } else {
        Ok(())
    }
}

/// Validates a state handed out by the encoder or evolver: finite and unit norm.
pub fn validate_state(state: &QuantumState, norm_tolerance: Option<f64>) -> Result<(), RefineError> {
    if !state.is_finite() {
        return Err(RefineError::NumericalInstability {
            message: "state contains non-finite amplitudes".to_string(),
        });
    }
    check_normalization(state, norm_tolerance)
}
