// src/reflection/mod.rs

//! The reflection loop: generate a stepwise solution, then refine it step by
//! step until the text stabilizes, the encoded states converge, or the
//! iteration budget runs out.
//!
//! ```text
//! INIT -> GENERATING_INITIAL -> ITERATING -> { STABLE | CONVERGED | MAX_ITERATIONS }
//! ```
//!
//! A [`ReflectionController`] holds only read-only collaborators; each
//! [`ReflectionController::solve`] call creates its own run state, so one
//! controller can serve concurrent calls.

pub mod observer;
pub mod results;
mod run;

pub use observer::{NoopObserver, ReflectionObserver, TracingObserver};
pub use results::{ConvergenceRecord, IterationReport, SolveOutcome, StepRefinement, Termination};

use std::sync::{Arc, LazyLock};

use crate::config::SolverConfig;
use crate::core::{Component, OracleError, RefineError, SolveError};
use crate::dynamics::{Evolver, HamiltonianCache};
use crate::encoding::{StateEncoder, Tokenizer};
use crate::oracle::{GenerationRequest, Oracle};
use crate::prompts::{DefaultPrompts, PromptTemplates};
use crate::stability::{FingerprintPolicy, StabilityTracker};
use run::ReflectionRun;

/// Propagators shared by every controller built with [`ReflectionController::new`].
static SHARED_DYNAMICS: LazyLock<HamiltonianCache> = LazyLock::new(HamiltonianCache::new);

/// Drives an [`Oracle`] through iterative step refinement.
pub struct ReflectionController {
    oracle: Arc<dyn Oracle>,
    tokenizer: Arc<dyn Tokenizer>,
    config: SolverConfig,
    encoder: StateEncoder,
    evolver: Evolver,
    prompts: Arc<dyn PromptTemplates>,
    /// Empty tracker cloned at the start of every run.
    stability: StabilityTracker,
    observer: Arc<dyn ReflectionObserver>,
}

impl ReflectionController {
    /// Creates a controller for `config.dimension`.
    ///
    /// The propagator is taken from a process-wide cache. The first
    /// controller of a dimension pays for the matrix exponential, which is
    /// `O(D³)` per multiplication and takes seconds at the default `D = 512`;
    /// later controllers of that dimension reuse it.
    ///
    /// # Returns
    /// * `Err(RefineError::InvalidConfig)` if `config` fails validation.
    /// * `Err(RefineError::NumericalInstability)` if the propagator cannot be
    ///   computed.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        tokenizer: Arc<dyn Tokenizer>,
        config: SolverConfig,
    ) -> Result<Self, RefineError> {
        config.validate()?;
        let evolver = Evolver::from_cache(&SHARED_DYNAMICS, config.dimension)?;
        Self::assemble(oracle, tokenizer, config, evolver)
    }

    /// Like [`ReflectionController::new`], with a caller-owned cache.
    pub fn with_cache(
        oracle: Arc<dyn Oracle>,
        tokenizer: Arc<dyn Tokenizer>,
        config: SolverConfig,
        cache: &HamiltonianCache,
    ) -> Result<Self, RefineError> {
        config.validate()?;
        let evolver = Evolver::from_cache(cache, config.dimension)?;
        Self::assemble(oracle, tokenizer, config, evolver)
    }

    /// Like [`ReflectionController::new`] with a prebuilt evolver.
    ///
    /// # Returns
    /// * `Err(RefineError::DimensionMismatch)` if the evolver's dimension
    ///   differs from `config.dimension`.
    pub fn with_evolver(
        oracle: Arc<dyn Oracle>,
        tokenizer: Arc<dyn Tokenizer>,
        config: SolverConfig,
        evolver: Evolver,
    ) -> Result<Self, RefineError> {
        config.validate()?;
        if evolver.dim() != config.dimension {
            return Err(RefineError::DimensionMismatch { expected: config.dimension, found: evolver.dim() });
        }
        Self::assemble(oracle, tokenizer, config, evolver)
    }

    fn assemble(
        oracle: Arc<dyn Oracle>,
        tokenizer: Arc<dyn Tokenizer>,
        config: SolverConfig,
        evolver: Evolver,
    ) -> Result<Self, RefineError> {
        let encoder = StateEncoder::new(config.dimension)?;
        let stability = StabilityTracker::new(config.stability_window, config.stability_threshold)?;
        let prompts: Arc<dyn PromptTemplates> = Arc::new(DefaultPrompts::new(config.domain));
        Ok(Self {
            oracle,
            tokenizer,
            config,
            encoder,
            evolver,
            prompts,
            stability,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replaces the prompt templates.
    pub fn with_prompts(mut self, prompts: Arc<dyn PromptTemplates>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Replaces the lexical fingerprint used by the stability check.
    pub fn with_fingerprint_policy(mut self, policy: Arc<dyn FingerprintPolicy>) -> Self {
        self.stability = self.stability.with_fingerprint(policy);
        self
    }

    /// Replaces the observer (default: [`TracingObserver`]).
    pub fn with_observer(mut self, observer: Arc<dyn ReflectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The validated configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The evolver shared by every run.
    pub fn evolver(&self) -> &Evolver {
        &self.evolver
    }

    /// Solves `problem`, refining its steps until a stop condition fires.
    ///
    /// Oracle calls are awaited one at a time, in step order, each bounded by
    /// the configured timeout.
    ///
    /// # Errors
    /// A [`SolveError`] naming the component and iteration that failed. No
    /// partial outcome is returned.
    pub async fn solve(&self, problem: &str, max_new_tokens: usize) -> Result<SolveOutcome, SolveError> {
        match ReflectionRun::new(self).execute(problem, max_new_tokens).await {
            Ok(outcome) => {
                self.observer.on_terminate(&outcome);
                Ok(outcome)
            }
            Err(err) => {
                self.observer.on_abort(&err);
                Err(err)
            }
        }
    }

    /// Asks the oracle to merge the steps of `outcome` into one solution.
    ///
    /// The coherence figure in the prompt is the mean amplitude of the
    /// evolved state of the joined steps. The response is returned trimmed.
    pub async fn integrate(&self, outcome: &SolveOutcome, max_new_tokens: usize) -> Result<String, SolveError> {
        let joined = outcome.steps.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
        let encoded = self
            .encoder
            .encode_text(self.tokenizer.as_ref(), &joined)
            .map_err(|e| SolveError::new(Component::Encoding, None, e))?;
        let state = self
            .evolver
            .evolve(&encoded)
            .map_err(|e| SolveError::new(Component::Evolution, None, e))?;

        let request = GenerationRequest::new(
            self.prompts.integration_prompt(&outcome.steps, state.mean_amplitude()),
            max_new_tokens,
            self.config.refine_temperature,
            self.config.refine_sampling,
        );
        let response = self
            .call_oracle(&request)
            .await
            .map_err(|e| SolveError::new(Component::Integration, None, e))?;
        Ok(response.trim().to_string())
    }

    /// One oracle call under the configured timeout; blank text is an error.
    async fn call_oracle(&self, request: &GenerationRequest) -> Result<String, RefineError> {
        let limit = self.config.oracle_timeout();
        let response = tokio::time::timeout(limit, self.oracle.generate(request))
            .await
            .map_err(|_| OracleError::Timeout { after: limit })??;
        if response.trim().is_empty() {
            return Err(OracleError::EmptyResponse.into());
        }
        Ok(response)
    }
}

impl std::fmt::Debug for ReflectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectionController")
            .field("config", &self.config)
            .field("encoder", &self.encoder)
            .field("stability", &self.stability)
            .finish_non_exhaustive()
    }
}
