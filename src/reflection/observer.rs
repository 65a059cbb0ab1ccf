// src/reflection/observer.rs

//! Narration of a solve run, kept apart from control decisions.

use tracing::{debug, info, warn};

use super::results::{IterationReport, SolveOutcome, StepRefinement};
use crate::core::SolveError;
use crate::steps::Step;

/// Receives progress events from the reflection loop.
///
/// Every method defaults to doing nothing. Observers cannot influence the
/// loop; they only see what it decided.
pub trait ReflectionObserver: Send + Sync {
    /// A solve call started.
    fn on_solve_start(&self, _problem: &str) {}

    /// Steps were extracted from the initial response.
    fn on_initial_steps(&self, _steps: &[Step]) {}

    /// An iteration started with this joined solution text.
    fn on_iteration_start(&self, _iteration: usize, _solution: &str) {}

    /// The stability check of an iteration completed.
    fn on_stability(&self, _iteration: usize, _stable: bool, _consecutive: usize) {}

    /// A step was refined by the oracle and scored.
    fn on_step_refined(&self, _refinement: &StepRefinement) {}

    /// A step's convergence window settled; its text is held for this pass.
    fn on_step_converged(&self, _iteration: usize, _position: usize) {}

    /// A refinement pass completed.
    fn on_iteration_end(&self, _report: &IterationReport) {}

    /// The loop reached a terminal state.
    fn on_terminate(&self, _outcome: &SolveOutcome) {}

    /// The solve failed; no outcome follows.
    fn on_abort(&self, _error: &SolveError) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ReflectionObserver for NoopObserver {}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ReflectionObserver for TracingObserver {
    fn on_solve_start(&self, problem: &str) {
        info!(problem_chars = problem.chars().count(), "Starting reflection solve");
    }

    fn on_initial_steps(&self, steps: &[Step]) {
        info!(steps = steps.len(), "Extracted initial steps");
        for step in steps {
            debug!(number = step.number, title = step.title(), "Initial step");
        }
    }

    fn on_iteration_start(&self, iteration: usize, solution: &str) {
        info!(iteration = iteration + 1, solution_chars = solution.chars().count(), "Reflection iteration");
    }

    fn on_stability(&self, iteration: usize, stable: bool, consecutive: usize) {
        debug!(iteration = iteration + 1, stable, consecutive, "Solution stability check");
    }

    fn on_step_refined(&self, r: &StepRefinement) {
        debug!(
            iteration = r.iteration + 1,
            step = r.position,
            certainty = r.certainty,
            fidelity = r.fidelity,
            source = ?r.source,
            "Step refined"
        );
    }

    fn on_step_converged(&self, iteration: usize, position: usize) {
        info!(iteration = iteration + 1, step = position, "Step converged");
    }

    fn on_iteration_end(&self, report: &IterationReport) {
        info!(
            iteration = report.iteration + 1,
            consecutive_stable = report.consecutive_stable,
            steps_converged = report.steps_converged,
            aggregate_convergence = ?report.aggregate_convergence,
            integration_certainty = report.integration_certainty,
            "Iteration complete"
        );
    }

    fn on_terminate(&self, outcome: &SolveOutcome) {
        info!(
            termination = %outcome.termination,
            iterations = outcome.iterations_used,
            steps = outcome.steps.len(),
            final_convergence = ?outcome.final_convergence(),
            "Reflection finished"
        );
    }

    fn on_abort(&self, error: &SolveError) {
        warn!(
            component = %error.component,
            iteration = ?error.iteration,
            transient = error.source.is_transient(),
            error = %error.source,
            "Reflection aborted"
        );
    }
}
