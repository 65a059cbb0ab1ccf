// src/dynamics/evolution.rs

use num_complex::Complex;
use std::sync::Arc;

use super::hamiltonian::{Hamiltonian, HamiltonianCache};
use super::matrix::SquareMatrix;
use crate::core::{QuantumState, RefineError};

/// Scaled matrices are brought under this 1-norm before the Taylor series.
const SCALING_NORM_BOUND: f64 = 0.5;
const MAX_TAYLOR_TERMS: usize = 30;
const TAYLOR_TERM_TOLERANCE: f64 = 1e-18;

/// Matrix exponential by scaling and squaring over a truncated Taylor series.
///
/// `exp(A) = (exp(A / 2^s))^(2^s)` with `s` chosen so that `‖A / 2^s‖₁ ≤ 1/2`.
///
/// # Returns
/// * `Err(RefineError::NumericalInstability)` if the input or any
///   intermediate result contains non-finite entries.
pub fn matrix_exponential(a: &SquareMatrix) -> Result<SquareMatrix, RefineError> {
    if !a.is_finite() {
        return Err(RefineError::NumericalInstability {
            message: "matrix exponential input contains non-finite entries".to_string(),
        });
    }

    let norm = a.one_norm();
    let mut squarings: u32 = 0;
    if norm > SCALING_NORM_BOUND {
        squarings = (norm / SCALING_NORM_BOUND).log2().ceil() as u32;
    }
    let scaled = a.scale(Complex::new(0.5_f64.powi(squarings as i32), 0.0));

    // Σ A^k / k!
    let mut result = SquareMatrix::identity(a.dim());
    let mut term = SquareMatrix::identity(a.dim());
    for k in 1..=MAX_TAYLOR_TERMS {
        term = term.mul(&scaled).scale(Complex::new(1.0 / k as f64, 0.0));
        result = result.add(&term);
        if term.one_norm() < TAYLOR_TERM_TOLERANCE {
            break;
        }
    }

    for _ in 0..squarings {
        result = result.mul(&result);
    }

    if !result.is_finite() {
        return Err(RefineError::NumericalInstability {
            message: format!(
                "matrix exponential diverged (dimension {}, 1-norm {:.3e}, {} squarings)",
                a.dim(),
                norm,
                squarings
            ),
        });
    }
    Ok(result)
}

/// The unitary `U = exp(-iH)` for one Hamiltonian.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagator {
    unitary: SquareMatrix,
}

impl Propagator {
    /// Computes `exp(-iH)`. Because `H` is Hermitian, `-iH` is skew-Hermitian
    /// and the exponential is unitary.
    pub fn from_hamiltonian(hamiltonian: &Hamiltonian) -> Result<Self, RefineError> {
        let generator = hamiltonian.matrix().scale(Complex::new(0.0, -1.0));
        Ok(Self { unitary: matrix_exponential(&generator)? })
    }

    /// Dimension D.
    pub fn dim(&self) -> usize {
        self.unitary.dim()
    }

    /// The unitary matrix.
    pub fn matrix(&self) -> &SquareMatrix {
        &self.unitary
    }

    /// Applies `U` to `state`.
    pub fn apply(&self, state: &QuantumState) -> Result<QuantumState, RefineError> {
        let evolved = self.unitary.apply(state)?;
        if !evolved.is_finite() {
            return Err(RefineError::NumericalInstability {
                message: "evolved state contains non-finite amplitudes".to_string(),
            });
        }
        Ok(evolved)
    }
}

/// Evolves encoded states under the fixed Hamiltonian of one dimension.
///
/// The propagator is computed once at construction and shared by clones.
#[derive(Debug, Clone)]
pub struct Evolver {
    hamiltonian: Arc<Hamiltonian>,
    propagator: Arc<Propagator>,
}

impl Evolver {
    /// Builds the Hamiltonian and propagator for `dimension`.
    pub fn new(dimension: usize) -> Result<Self, RefineError> {
        Self::from_hamiltonian(Arc::new(Hamiltonian::build(dimension)?))
    }

    /// Reuses the Hamiltonian and propagator held by `cache`.
    pub fn from_cache(cache: &HamiltonianCache, dimension: usize) -> Result<Self, RefineError> {
        let (hamiltonian, propagator) = cache.get_or_build_propagator(dimension)?;
        Ok(Self { hamiltonian, propagator })
    }

    /// Wraps an already-built Hamiltonian.
    pub fn from_hamiltonian(hamiltonian: Arc<Hamiltonian>) -> Result<Self, RefineError> {
        let propagator = Arc::new(Propagator::from_hamiltonian(&hamiltonian)?);
        Ok(Self { hamiltonian, propagator })
    }

    /// Dimension D.
    pub fn dim(&self) -> usize {
        self.hamiltonian.dim()
    }

    /// The Hamiltonian driving the evolution.
    pub fn hamiltonian(&self) -> &Hamiltonian {
        &self.hamiltonian
    }

    /// The cached propagator.
    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    /// `exp(-iH) |state>`; unit norm in, unit norm out (within tolerance).
    pub fn evolve(&self, state: &QuantumState) -> Result<QuantumState, RefineError> {
        self.propagator.apply(state)
    }
}
