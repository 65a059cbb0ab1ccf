// src/dynamics/mod.rs

//! Fixed Hermitian operator and the unitary evolution it generates.
//!
//! Encoded states are passed through `U = exp(-iH)` before they are compared.
//! The Hamiltonian depends only on the dimension, so one [`Evolver`] (and its
//! propagator) serves every encode call of a solve run.

mod matrix;
mod hamiltonian;
mod evolution;

pub use matrix::SquareMatrix;
pub use hamiltonian::{Hamiltonian, HamiltonianCache};
pub use evolution::{matrix_exponential, Evolver, Propagator};
