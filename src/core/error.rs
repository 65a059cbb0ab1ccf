//! Error handling logic

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a text-generation oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The oracle call itself failed (transport, model or backend error).
    #[error("Oracle call failed: {message}")]
    Failed {
        /// Failure message reported by the oracle
        message: String,
    },

    /// The oracle did not answer within the configured timeout.
    #[error("Oracle call timed out after {}ms", .after.as_millis())]
    Timeout {
        /// Elapsed time at which the call was abandoned
        after: Duration,
    },

    /// The oracle answered with empty (or whitespace-only) text.
    #[error("Oracle returned an empty response")]
    EmptyResponse,
}

/// Error types raised by the encoder, the dynamics and the reflection loop.
///
/// Numeric variants (`Encoding`, `NumericalInstability`, `Incoherence`,
/// `DimensionMismatch`) indicate a broken invariant and are never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RefineError {
    /// Text could not be turned into a normalizable state vector
    /// (empty token sequence, zero vocabulary, all-zero amplitudes).
    #[error("Encoding Error: {message}")]
    Encoding {
        /// Encoding failure message
        message: String,
    },

    /// The oracle failed, timed out or returned nothing.
    #[error("Oracle Error: {0}")]
    Oracle(#[from] OracleError),

    /// No step markers were found where steps were required.
    #[error("Extraction Error: {message}")]
    Extraction {
        /// Extraction failure message
        message: String,
    },

    /// A numeric routine produced non-finite values.
    #[error("Numerical Instability: {message}")]
    NumericalInstability {
        /// NumericalInstability failure message
        message: String,
    },

    /// Two operands did not share the same dimension.
    #[error("Dimension Mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimension required by the receiving operation
        expected: usize,
        /// Dimension actually supplied
        found: usize,
    },

    /// A validation check on a state or operator failed.
    #[error("Incoherence Violation: {message}")]
    Incoherence {
        /// Incoherence failure message
        message: String,
    },

    /// Configuration values are out of range or could not be loaded.
    #[error("Invalid Configuration: {message}")]
    InvalidConfig {
        /// InvalidConfig failure message
        message: String,
    },
}

impl RefineError {
    /// Only oracle failures are transient; everything else is a broken invariant.
    pub fn is_transient(&self) -> bool {
        matches!(self, RefineError::Oracle(_))
    }
}

/// The part of the reflection loop in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// The first oracle call and extraction of the initial steps.
    InitialGeneration,
    /// Text to state encoding.
    Encoding,
    /// Unitary evolution of an encoded state.
    Evolution,
    /// Oracle call refining a single step.
    Reflection,
    /// Fidelity and aggregate convergence measurement.
    Convergence,
    /// Oracle call merging finished steps into one solution.
    Integration,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::InitialGeneration => "initial generation",
            Component::Encoding => "encoding",
            Component::Evolution => "evolution",
            Component::Reflection => "reflection",
            Component::Convergence => "convergence",
            Component::Integration => "integration",
        };
        f.write_str(name)
    }
}

fn describe_iteration(iteration: &Option<usize>) -> String {
    match iteration {
        Some(i) => format!("iteration {}", i),
        None => "before iterating".to_string(),
    }
}

/// Failure of a whole `solve` invocation, tagged with where it happened.
/// No partial solution is ever returned alongside it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("solve failed during {component} ({}): {source}", describe_iteration(.iteration))]
pub struct SolveError {
    /// Component that raised the error.
    pub component: Component,
    /// Zero-based iteration index, `None` before the iteration loop started.
    pub iteration: Option<usize>,
    /// Underlying cause.
    #[source]
    pub source: RefineError,
}

impl SolveError {
    pub(crate) fn new(component: Component, iteration: Option<usize>, source: RefineError) -> Self {
        Self { component, iteration, source }
    }
}
