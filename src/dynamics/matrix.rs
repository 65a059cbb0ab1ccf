// src/dynamics/matrix.rs

use num_complex::Complex;
use num_traits::{One, Zero};

use crate::core::{QuantumState, RefineError};

/// Dense row-major square complex matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    dim: usize,
    entries: Vec<Complex<f64>>,
}

impl SquareMatrix {
    /// All-zero matrix of dimension `dim`.
    pub fn zeros(dim: usize) -> Self {
        Self { dim, entries: vec![Complex::zero(); dim * dim] }
    }

    /// Identity matrix of dimension `dim`.
    pub fn identity(dim: usize) -> Self {
        let mut m = Self::zeros(dim);
        for i in 0..dim {
            m.set(i, i, Complex::one());
        }
        m
    }

    /// Number of rows (and columns).
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Entry at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Complex<f64> {
        self.entries[row * self.dim + col]
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: Complex<f64>) {
        self.entries[row * self.dim + col] = value;
    }

    /// Conjugate transpose `M†`.
    pub fn conjugate_transpose(&self) -> Self {
        let mut out = Self::zeros(self.dim);
        for i in 0..self.dim {
            for j in 0..self.dim {
                out.set(j, i, self.get(i, j).conj());
            }
        }
        out
    }

    /// Element-wise sum.
    pub fn add(&self, other: &SquareMatrix) -> Self {
        let entries = self.entries.iter().zip(other.entries.iter()).map(|(a, b)| a + b).collect();
        Self { dim: self.dim, entries }
    }

    /// Multiplies every entry by `factor`.
    pub fn scale(&self, factor: Complex<f64>) -> Self {
        Self { dim: self.dim, entries: self.entries.iter().map(|c| c * factor).collect() }
    }

    /// Matrix product `self · other`.
    pub fn mul(&self, other: &SquareMatrix) -> Self {
        let n = self.dim;
        let mut out = Self::zeros(n);
        for i in 0..n {
            for k in 0..n {
                let a = self.entries[i * n + k];
                if a.is_zero() {
                    continue;
                }
                let row = &other.entries[k * n..(k + 1) * n];
                let out_row = &mut out.entries[i * n..(i + 1) * n];
                for (o, b) in out_row.iter_mut().zip(row.iter()) {
                    *o += a * b;
                }
            }
        }
        out
    }

    /// Applies the matrix to a state: `M |ψ>`.
    pub fn apply(&self, state: &QuantumState) -> Result<QuantumState, RefineError> {
        if state.dim() != self.dim {
            return Err(RefineError::DimensionMismatch { expected: self.dim, found: state.dim() });
        }
        let psi = state.vector();
        let out: Vec<Complex<f64>> = (0..self.dim)
            .map(|i| {
                self.entries[i * self.dim..(i + 1) * self.dim]
                    .iter()
                    .zip(psi.iter())
                    .map(|(m, p)| m * p)
                    .sum::<Complex<f64>>()
            })
            .collect();
        Ok(QuantumState::new(out))
    }

    /// Maximum absolute column sum (induced 1-norm).
    pub fn one_norm(&self) -> f64 {
        (0..self.dim)
            .map(|j| (0..self.dim).map(|i| self.get(i, j).norm()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    /// Largest entry-wise distance to `other`.
    pub fn max_abs_diff(&self, other: &SquareMatrix) -> f64 {
        self.entries
            .iter()
            .zip(other.entries.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max)
    }

    /// True when every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.entries.iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }
}
