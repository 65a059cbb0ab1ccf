// src/lib.rs

//! `qrefine` - Reflective refinement of stepwise LLM solutions
//!
//! A language model (the [`Oracle`]) produces a numbered solution; each step
//! is then sent back for improvement. Alongside the text loop, every step is
//! encoded into a unit-norm complex state and evolved under a fixed
//! Hermitian Hamiltonian, and the fidelity between successive states serves
//! as a convergence signal. The loop stops when the solution text stops
//! changing, when the states converge, or when the iteration budget is spent.

pub mod core;
pub mod encoding;
pub mod dynamics;
pub mod validation;
pub mod stability;
pub mod steps;
pub mod prompts;
pub mod oracle;
pub mod config;
pub mod reflection;

// Re-export the most common types for easier top-level use
pub use core::{Component, OracleError, QuantumState, RefineError, SolveError};
pub use encoding::{ByteTokenizer, StateEncoder, Tokenizer};
pub use dynamics::{Evolver, Hamiltonian, HamiltonianCache};
pub use stability::{FingerprintPolicy, LexicalFingerprint, StabilityTracker};
pub use steps::{extract_steps, SolutionState, Step};
pub use prompts::{DefaultPrompts, Domain, PromptTemplates};
pub use oracle::{GenerationRequest, Oracle, RetryPolicy, RetryingOracle};
pub use config::SolverConfig;
pub use reflection::{ReflectionController, ReflectionObserver, SolveOutcome, Termination};
pub use validation::{check_normalization, fidelity, validate_state};

// Example 1: Encode and evolve
// A step's text becomes a unit-norm state; evolution keeps it unit-norm and
// a state is fully faithful to itself.
/// ```
/// use qrefine::{ByteTokenizer, Evolver, StateEncoder, RefineError};
/// use qrefine::validation::{check_normalization, fidelity};
///
/// fn main() -> Result<(), RefineError> {
///     let encoder = StateEncoder::new(16)?;
///     let evolver = Evolver::new(16)?;
///
///     let state = encoder.encode_text(&ByteTokenizer, "Step 1: x + 1 = 3, so x = 2")?;
///     let evolved = evolver.evolve(&state)?;
///
///     check_normalization(&evolved, Some(1e-9))?;
///     assert!((fidelity(&evolved, &evolved)? - 1.0).abs() < 1e-9);
///     println!("certainty before {:.4}, after {:.4}", state.mean_amplitude(), evolved.mean_amplitude());
///     Ok(())
/// }
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item

// Example 2: A full solve against a fixed oracle
// An oracle that never changes its answer stops the loop early with the
// answer's steps intact.
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use qrefine::{ByteTokenizer, GenerationRequest, Oracle, OracleError, ReflectionController, SolverConfig};
///
/// struct Fixed;
///
/// #[async_trait]
/// impl Oracle for Fixed {
///     async fn generate(&self, _request: &GenerationRequest) -> Result<String, OracleError> {
///         Ok("Step 1: Subtract 1 from both sides, x = 2. Step 2: Check: 2 + 1 = 3.".to_string())
///     }
/// }
///
/// let config = SolverConfig { dimension: 16, ..SolverConfig::default() };
/// let controller = ReflectionController::new(Arc::new(Fixed), Arc::new(ByteTokenizer), config)
///     .expect("valid configuration");
///
/// let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
/// let outcome = runtime.block_on(controller.solve("Solve x + 1 = 3", 256)).expect("solve succeeds");
///
/// println!("{}", outcome);
/// assert_eq!(outcome.step_texts(), vec!["Subtract 1 from both sides, x = 2.", "Check: 2 + 1 = 3."]);
/// assert!(outcome.iterations_used <= 4);
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item
