// src/core/state.rs

use num_complex::Complex;
use std::fmt;

use super::error::RefineError;

/// A fixed-dimension complex state vector derived from text.
///
/// States handed out by the encoder and the evolver have unit L2 norm; the
/// vector is never mutated in place, every transformation builds a new state.
///
/// This is a deterministic classical encoding. Its only purpose is to produce
/// bounded scalar signals (mean amplitude, fidelity) for the reflection loop.
#[derive(Debug, Clone, PartialEq)] // Avoid Eq for floating-point complex numbers
pub struct QuantumState {
    amplitudes: Vec<Complex<f64>>,
}

impl QuantumState {
    /// Wraps a vector without normalizing it. Callers are responsible for
    /// the unit-norm invariant.
    pub(crate) fn new(amplitudes: Vec<Complex<f64>>) -> Self {
        Self { amplitudes }
    }

    /// Builds a unit-norm state by dividing `amplitudes` by their L2 norm.
    ///
    /// # Returns
    /// * `Err(RefineError::Encoding)` if the vector is empty, all-zero or non-finite.
    pub fn normalized(amplitudes: Vec<Complex<f64>>) -> Result<Self, RefineError> {
        if amplitudes.is_empty() {
            return Err(RefineError::Encoding {
                message: "cannot normalize a zero-dimensional vector".to_string(),
            });
        }
        let norm = l2_norm(&amplitudes);
        if !norm.is_finite() {
            return Err(RefineError::Encoding {
                message: format!("vector norm is not finite ({})", norm),
            });
        }
        if norm == 0.0 {
            return Err(RefineError::Encoding {
                message: "all amplitudes are zero, the vector cannot be normalized".to_string(),
            });
        }
        Ok(Self::new(amplitudes.into_iter().map(|c| c / norm).collect()))
    }

    /// Read-only access to the amplitudes.
    pub fn vector(&self) -> &[Complex<f64>] {
        &self.amplitudes
    }

    /// Dimension D of the state.
    pub fn dim(&self) -> usize {
        self.amplitudes.len()
    }

    /// L2 norm of the state (≈1 for every state produced by the crate).
    pub fn norm(&self) -> f64 {
        l2_norm(&self.amplitudes)
    }

    /// Mean magnitude of the components.
    ///
    /// Injected into prompts as the "certainty" figure. For a unit vector the
    /// value lies in `(0, 1/sqrt(D)]`.
    pub fn mean_amplitude(&self) -> f64 {
        if self.amplitudes.is_empty() {
            return 0.0;
        }
        self.amplitudes.iter().map(|c| c.norm()).sum::<f64>() / self.amplitudes.len() as f64
    }

    /// Hermitian inner product `<self|other>`, conjugate-linear in `self`.
    pub fn inner_product(&self, other: &QuantumState) -> Result<Complex<f64>, RefineError> {
        if self.dim() != other.dim() {
            return Err(RefineError::DimensionMismatch { expected: self.dim(), found: other.dim() });
        }
        Ok(self
            .amplitudes
            .iter()
            .zip(other.amplitudes.iter())
            .map(|(a, b)| a.conj() * b)
            .sum())
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.amplitudes.iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }
}

fn l2_norm(amplitudes: &[Complex<f64>]) -> f64 {
    amplitudes.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt()
}

impl fmt::Display for QuantumState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State[")?;
        for (i, c) in self.amplitudes.iter().enumerate() {
            write!(f, "{}{:.4}", if i > 0 { ", " } else { "" }, c)?;
        }
        write!(f, "]")
    }
}
