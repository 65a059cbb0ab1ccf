// src/dynamics/hamiltonian.rs

use num_complex::Complex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::evolution::Propagator;
use super::matrix::SquareMatrix;
use crate::core::{RefineError, PI};

/// Fixed Hermitian coupling operator over a ring of `D` sites.
///
/// Off-diagonal entry `(i, j)` couples sites at circular distance
/// `d = min(|i-j|, D-|i-j|)` with strength `1/(1+d)` and phase `e^(iπd/D)`;
/// the diagonal is zero. The raw matrix is then Hermitized as
/// `H ← (H + H†)/2`, which makes `H = H†` exact regardless of rounding.
///
/// `H` depends on nothing but `D`, so it is built once and shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Hamiltonian {
    matrix: SquareMatrix,
}

impl Hamiltonian {
    /// Builds the operator for dimension `dimension`.
    pub fn build(dimension: usize) -> Result<Self, RefineError> {
        if dimension == 0 {
            return Err(RefineError::InvalidConfig {
                message: "Hamiltonian dimension must be at least 1".to_string(),
            });
        }

        let mut raw = SquareMatrix::zeros(dimension);
        for i in 0..dimension {
            for j in 0..dimension {
                if i == j {
                    continue;
                }
                let separation = i.abs_diff(j);
                let distance = separation.min(dimension - separation);
                let coupling = 1.0 / (1.0 + distance as f64);
                let theta = PI * distance as f64 / dimension as f64;
                raw.set(i, j, Complex::from_polar(coupling, theta));
            }
        }

        let hermitian = raw.add(&raw.conjugate_transpose()).scale(Complex::new(0.5, 0.0));
        Ok(Self { matrix: hermitian })
    }

    /// Dimension D.
    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    /// The underlying matrix.
    pub fn matrix(&self) -> &SquareMatrix {
        &self.matrix
    }
}

/// Memoizes Hamiltonians, and the propagators computed from them, per
/// dimension.
///
/// Entries are immutable once built, so handing out `Arc` clones is safe
/// across threads and across concurrent `solve` calls.
#[derive(Debug, Default)]
pub struct HamiltonianCache {
    entries: Mutex<HashMap<usize, Arc<Hamiltonian>>>,
    propagators: Mutex<HashMap<usize, Arc<Propagator>>>,
}

impl HamiltonianCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached operator for `dimension`, building it on first use.
    pub fn get_or_build(&self, dimension: usize) -> Result<Arc<Hamiltonian>, RefineError> {
        let mut entries = self.entries.lock().map_err(|_| RefineError::NumericalInstability {
            message: "Hamiltonian cache lock poisoned".to_string(),
        })?;
        if let Some(h) = entries.get(&dimension) {
            return Ok(Arc::clone(h));
        }
        let h = Arc::new(Hamiltonian::build(dimension)?);
        entries.insert(dimension, Arc::clone(&h));
        Ok(h)
    }

    /// Returns the operator for `dimension` with its propagator `exp(-iH)`,
    /// computing the exponential on first use only.
    pub fn get_or_build_propagator(
        &self,
        dimension: usize,
    ) -> Result<(Arc<Hamiltonian>, Arc<Propagator>), RefineError> {
        let hamiltonian = self.get_or_build(dimension)?;
        let mut propagators = self.propagators.lock().map_err(|_| RefineError::NumericalInstability {
            message: "propagator cache lock poisoned".to_string(),
        })?;
        if let Some(p) = propagators.get(&dimension) {
            return Ok((hamiltonian, Arc::clone(p)));
        }
        let p = Arc::new(Propagator::from_hamiltonian(&hamiltonian)?);
        propagators.insert(dimension, Arc::clone(&p));
        Ok((hamiltonian, p))
    }

    /// Number of dimensions currently cached.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
