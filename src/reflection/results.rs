// src/reflection/results.rs
use std::fmt;

use crate::prompts::Domain;
use crate::steps::{ImprovedStepSource, Step};

/// Why the reflection loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The solution text was judged stable W times in a row.
    Stable,
    /// Aggregate state fidelity between iterations passed the threshold
    /// while the text was (nearly) stable.
    Converged,
    /// The iteration budget ran out.
    MaxIterations,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Termination::Stable => "stable",
            Termination::Converged => "converged",
            Termination::MaxIterations => "max iterations",
        };
        f.write_str(name)
    }
}

/// Append-only fidelity history of one `solve` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceRecord {
    values: Vec<f64>,
}

impl ConvergenceRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fidelity value.
    pub fn push(&mut self, fidelity: f64) {
        self.values.push(fidelity);
    }

    /// Number of recorded values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The last `n` values, or `None` if fewer were recorded.
    pub fn last(&self, n: usize) -> Option<&[f64]> {
        (n > 0 && self.values.len() >= n).then(|| &self.values[self.values.len() - n..])
    }

    /// True when the last `window` values spread by less than `max_spread`
    /// and average above `threshold`.
    pub fn is_settled(&self, window: usize, max_spread: f64, threshold: f64) -> bool {
        let Some(recent) = self.last(window) else {
            return false;
        };
        let max = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = recent.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        max - min < max_spread && mean > threshold
    }

    /// All values in recording order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Consumes the record.
    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

/// Result of refining one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRefinement {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// 1-based step position.
    pub position: usize,
    /// Mean amplitude of the step's state, as sent to the oracle.
    pub certainty: f64,
    /// Fidelity between the step's state before and after refinement.
    pub fidelity: f64,
    /// How the improved text was recovered from the response.
    pub source: ImprovedStepSource,
    /// The convergence window was settled after this step.
    pub settled: bool,
}

/// Summary of one completed refinement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// Stability check result at the start of the pass.
    pub stable: bool,
    /// Consecutive stable checks so far.
    pub consecutive_stable: usize,
    /// Steps whose convergence window settled during the pass.
    pub steps_converged: usize,
    /// Fidelity between this pass's step states and the previous pass's,
    /// `None` on the first pass.
    pub aggregate_convergence: Option<f64>,
    /// Mean amplitude of the state of all improved steps joined together.
    pub integration_certainty: f64,
}

/// What `solve` returns on any terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// The problem as given.
    pub problem: String,
    /// Domain the prompts were specialised for.
    pub domain: Option<Domain>,
    /// Step bodies of `steps` joined by spaces.
    pub final_solution: String,
    /// Working steps at termination.
    pub steps: Vec<Step>,
    /// Every per-step fidelity recorded, in order.
    pub convergence_history: Vec<f64>,
    /// Completed refinement passes.
    pub iterations_used: usize,
    /// Stop condition that fired.
    pub termination: Termination,
    /// `step_complexity` of each final step.
    pub complexity_scores: Vec<f64>,
}

impl SolveOutcome {
    /// Bodies of the final steps.
    pub fn step_texts(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.text.as_str()).collect()
    }

    /// Most recent fidelity, if any step was refined.
    pub fn final_convergence(&self) -> Option<f64> {
        self.convergence_history.last().copied()
    }
}

impl fmt::Display for SolveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solve Outcome ({}, {} iterations):", self.termination, self.iterations_used)?;
        if let Some(domain) = self.domain {
            writeln!(f, "  Domain: {}", domain)?;
        }
        for (step, complexity) in self.steps.iter().zip(self.complexity_scores.iter()) {
            writeln!(f, "  {} [complexity {:.3}]", step, complexity)?;
        }
        match self.final_convergence() {
            Some(c) => writeln!(f, "  Final convergence: {:.4}", c)?,
            None => writeln!(f, "  Final convergence: N/A")?,
        }
        Ok(())
    }
}
