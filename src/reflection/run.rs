// src/reflection/run.rs

//! State of a single `solve` invocation.
//!
//! Every history the loop keeps (stability window, fidelity record, per-step
//! states) lives here and is dropped when the call returns.

use tracing::warn;

use super::results::{ConvergenceRecord, IterationReport, SolveOutcome, StepRefinement, Termination};
use super::ReflectionController;
use crate::core::{Component, OracleError, QuantumState, RefineError, SolveError};
use crate::oracle::GenerationRequest;
use crate::prompts::ReflectionContext;
use crate::stability::StabilityTracker;
use crate::steps::{select_improved_step, step_complexity, ImprovedStepSource, SolutionState, Step};
use crate::validation::{aggregate_fidelity, fidelity, validate_state};

fn at(component: Component, iteration: usize) -> impl FnOnce(RefineError) -> SolveError {
    move |source| SolveError::new(component, Some(iteration), source)
}

pub(super) struct ReflectionRun<'a> {
    controller: &'a ReflectionController,
    tracker: StabilityTracker,
    record: ConvergenceRecord,
    /// Pre-refinement state of every step, in refinement order.
    state_history: Vec<QuantumState>,
    consecutive_stable: usize,
}

impl<'a> ReflectionRun<'a> {
    pub(super) fn new(controller: &'a ReflectionController) -> Self {
        let mut tracker = controller.stability.clone();
        tracker.reset();
        Self {
            controller,
            tracker,
            record: ConvergenceRecord::new(),
            state_history: Vec::new(),
            consecutive_stable: 0,
        }
    }

    pub(super) async fn execute(mut self, problem: &str, max_new_tokens: usize) -> Result<SolveOutcome, SolveError> {
        let ctl = self.controller;
        let config = &ctl.config;
        ctl.observer.on_solve_start(problem);

        let request = GenerationRequest::new(
            ctl.prompts.initial_prompt(problem),
            max_new_tokens,
            config.initial_temperature,
            config.initial_sampling,
        );
        let response = ctl
            .call_oracle(&request)
            .await
            .map_err(|e| SolveError::new(Component::InitialGeneration, None, e))?;
        let mut solution = SolutionState::from_response(&response);
        if solution.is_empty() {
            return Err(SolveError::new(
                Component::InitialGeneration,
                None,
                RefineError::Extraction { message: "initial response contains no step markers".to_string() },
            ));
        }
        ctl.observer.on_initial_steps(solution.steps());

        let window = config.stability_window;
        let mut termination = Termination::MaxIterations;
        let mut iterations_used = config.max_iterations;

        for iteration in 0..config.max_iterations {
            let text = solution.joined();
            ctl.observer.on_iteration_start(iteration, &text);

            let stable = self.tracker.update(&text);
            if stable {
                self.consecutive_stable += 1;
            } else {
                self.consecutive_stable = 0;
            }
            ctl.observer.on_stability(iteration, stable, self.consecutive_stable);
            if self.consecutive_stable >= window {
                termination = Termination::Stable;
                iterations_used = iteration;
                break;
            }

            let total = solution.len();
            let mut refined = Vec::with_capacity(total);
            let mut next_steps = Vec::with_capacity(total);
            let mut steps_converged = 0;
            for (index, step) in solution.steps().iter().enumerate() {
                let (improved, settled) = self.refine_step(iteration, index + 1, total, step, max_new_tokens).await?;
                if settled {
                    steps_converged += 1;
                    next_steps.push(step.clone());
                } else {
                    next_steps.push(Step::new(step.number, improved.clone()));
                }
                refined.push(improved);
            }

            let integration_certainty = self.prepare_state(iteration, &refined.join(" "))?.mean_amplitude();
            let aggregate_convergence = self.aggregate_convergence(iteration, total)?;
            ctl.observer.on_iteration_end(&IterationReport {
                iteration,
                stable,
                consecutive_stable: self.consecutive_stable,
                steps_converged,
                aggregate_convergence,
                integration_certainty,
            });

            let converged = aggregate_convergence.is_some_and(|c| c > config.convergence_threshold)
                && self.consecutive_stable >= window.saturating_sub(1);
            if converged {
                termination = Termination::Converged;
                iterations_used = iteration + 1;
                break;
            }

            if config.carry_forward {
                solution = SolutionState::new(next_steps);
            }
        }

        let complexity_scores = solution.steps().iter().map(|s| step_complexity(&s.text)).collect();
        Ok(SolveOutcome {
            problem: problem.to_string(),
            domain: config.domain,
            final_solution: solution.joined(),
            steps: solution.into_steps(),
            convergence_history: self.record.into_vec(),
            iterations_used,
            termination,
            complexity_scores,
        })
    }

    /// Refines one step; returns the improved text and whether the
    /// convergence window settled on it.
    async fn refine_step(
        &mut self,
        iteration: usize,
        position: usize,
        total: usize,
        step: &Step,
        max_new_tokens: usize,
    ) -> Result<(String, bool), SolveError> {
        let ctl = self.controller;
        let config = &ctl.config;

        let current = self.prepare_state(iteration, &step.text)?;
        let certainty = current.mean_amplitude();
        let prompt = ctl.prompts.reflection_prompt(&ReflectionContext {
            step: &step.text,
            position,
            total,
            certainty,
            complexity: step_complexity(&step.text),
        });
        self.state_history.push(current.clone());

        let request = GenerationRequest::new(prompt, max_new_tokens, config.refine_temperature, config.refine_sampling);
        let response = ctl.call_oracle(&request).await.map_err(at(Component::Reflection, iteration))?;
        let Some((improved_text, source)) = select_improved_step(&response, position) else {
            return Err(SolveError::new(Component::Reflection, Some(iteration), OracleError::EmptyResponse.into()));
        };
        if source == ImprovedStepSource::Unlabeled {
            warn!(
                iteration = iteration + 1,
                step = position,
                "Refinement response has no step markers, keeping raw text as one step"
            );
        }

        let improved = self.prepare_state(iteration, &improved_text)?;
        let step_fidelity = fidelity(&current, &improved).map_err(at(Component::Convergence, iteration))?;
        self.record.push(step_fidelity);
        let settled = self.record.is_settled(
            config.convergence_window,
            config.stability_threshold,
            config.convergence_threshold,
        );

        ctl.observer.on_step_refined(&StepRefinement {
            iteration,
            position,
            certainty,
            fidelity: step_fidelity,
            source,
            settled,
        });
        if settled {
            ctl.observer.on_step_converged(iteration, position);
        }
        Ok((improved_text, settled))
    }

    /// Encodes and evolves `text`, checking the result is a valid state.
    fn prepare_state(&self, iteration: usize, text: &str) -> Result<QuantumState, SolveError> {
        let ctl = self.controller;
        let encoded = ctl
            .encoder
            .encode_text(ctl.tokenizer.as_ref(), text)
            .map_err(at(Component::Encoding, iteration))?;
        let evolved = ctl.evolver.evolve(&encoded).map_err(at(Component::Evolution, iteration))?;
        validate_state(&evolved, None).map_err(at(Component::Evolution, iteration))?;
        Ok(evolved)
    }

    /// Fidelity of the last `n` step states against the `n` before them.
    fn aggregate_convergence(&self, iteration: usize, n: usize) -> Result<Option<f64>, SolveError> {
        let len = self.state_history.len();
        if iteration == 0 || n == 0 || len < 2 * n {
            return Ok(None);
        }
        let current = &self.state_history[len - n..];
        let previous = &self.state_history[len - 2 * n..len - n];
        aggregate_fidelity(current, previous)
            .map(Some)
            .map_err(at(Component::Convergence, iteration))
    }
}
