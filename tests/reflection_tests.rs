// tests/reflection_tests.rs

// End-to-end runs of the reflection loop against stub oracles
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use qrefine::dynamics::{Evolver, HamiltonianCache};
use qrefine::reflection::{IterationReport, StepRefinement};
use qrefine::steps::ImprovedStepSource;
use qrefine::{
    ByteTokenizer, Component, FingerprintPolicy, GenerationRequest, Oracle, OracleError, ReflectionController,
    ReflectionObserver, RefineError, SolveError, SolveOutcome, SolverConfig, Step, Termination, Tokenizer,
};

const TWO_STEPS: &str = "Step 1: Let x = 2. Step 2: Then x + 1 = 3.";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> SolverConfig {
    SolverConfig { dimension: 16, oracle_timeout_ms: 5_000, ..SolverConfig::default() }
}

fn controller(oracle: Arc<dyn Oracle>, config: SolverConfig) -> ReflectionController {
    ReflectionController::new(oracle, Arc::new(ByteTokenizer), config).expect("valid test configuration")
}

// --- Stub oracles ---

/// Returns the same text for every request.
struct Constant {
    text: String,
    calls: AtomicUsize,
}

impl Constant {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self { text: text.to_string(), calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl Oracle for Constant {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Two steps with fresh random numbers of random length on every call.
struct Random {
    rng: Mutex<StdRng>,
}

impl Random {
    fn seeded(seed: u64) -> Arc<Self> {
        Arc::new(Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) })
    }
}

#[async_trait]
impl Oracle for Random {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, OracleError> {
        let mut guard = self.rng.lock().map_err(|e| OracleError::Failed { message: e.to_string() })?;
        let rng: &mut StdRng = &mut guard;
        let a = random_digits(rng);
        let b = random_digits(rng);
        Ok(format!("Step 1: a = {}. Step 2: b = {}.", a, b))
    }
}

fn random_digits(rng: &mut StdRng) -> String {
    let len = rng.random_range(1..12);
    (0..len).map(|_| char::from(b'0' + rng.random_range(0..10u8))).collect()
}

/// Never answers within any test timeout.
struct Hanging;

#[async_trait]
impl Oracle for Hanging {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, OracleError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(TWO_STEPS.to_string())
    }
}

/// Answers the first call with `initial`, later calls with `then`.
struct Scripted {
    initial: String,
    then: Reply,
    calls: AtomicUsize,
}

enum Reply {
    Text(String),
    Hang,
}

impl Scripted {
    fn new(initial: &str, then: Reply) -> Arc<Self> {
        Arc::new(Self { initial: initial.to_string(), then, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl Oracle for Scripted {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, OracleError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(self.initial.clone());
        }
        match &self.then {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(String::new())
            }
        }
    }
}

/// Echoes each step back with " ok" appended, unlabeled.
struct Echo;

#[async_trait]
impl Oracle for Echo {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OracleError> {
        let Some((_, rest)) = request.prompt.split_once("Current Step:\n") else {
            return Ok(TWO_STEPS.to_string());
        };
        let step = rest.split("\n\nConsider:").next().unwrap_or(rest);
        Ok(format!("{} ok", step.trim()))
    }
}

/// Answers every call with `reply` and keeps the last prompt.
struct Capturing {
    reply: String,
    last_prompt: Mutex<String>,
}

#[async_trait]
impl Oracle for Capturing {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OracleError> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = request.prompt.clone();
        }
        Ok(self.reply.clone())
    }
}

// --- Tokenizers ---

/// Sees only ASCII digits, so texts differing in words encode identically.
struct DigitsOnly;

impl Tokenizer for DigitsOnly {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.bytes().filter(u8::is_ascii_digit).map(u32::from).collect()
    }

    fn vocab_size(&self) -> usize {
        256
    }
}

/// Produces no tokens for any text mentioning `EMPTY`.
struct Blank;

impl Tokenizer for Blank {
    fn encode(&self, text: &str) -> Vec<u32> {
        if text.contains("EMPTY") {
            return Vec::new();
        }
        text.bytes().map(u32::from).collect()
    }

    fn vocab_size(&self) -> usize {
        256
    }
}

// --- Observer ---

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<String>>,
    refinements: Mutex<Vec<StepRefinement>>,
    converged: Mutex<Vec<(usize, usize)>>,
}

impl Recording {
    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ReflectionObserver for Recording {
    fn on_solve_start(&self, _problem: &str) {
        self.push("start".to_string());
    }

    fn on_initial_steps(&self, steps: &[Step]) {
        self.push(format!("initial {}", steps.len()));
    }

    fn on_iteration_start(&self, iteration: usize, _solution: &str) {
        self.push(format!("iteration {}", iteration));
    }

    fn on_step_refined(&self, refinement: &StepRefinement) {
        self.push(format!("refined {}", refinement.position));
        if let Ok(mut all) = self.refinements.lock() {
            all.push(refinement.clone());
        }
    }

    fn on_iteration_end(&self, report: &IterationReport) {
        self.push(format!("end {}", report.iteration));
    }

    fn on_step_converged(&self, iteration: usize, position: usize) {
        if let Ok(mut all) = self.converged.lock() {
            all.push((iteration, position));
        }
    }

    fn on_terminate(&self, outcome: &SolveOutcome) {
        self.push(format!("terminate {}", outcome.termination));
    }

    fn on_abort(&self, error: &SolveError) {
        self.push(format!("abort {}", error.component));
    }
}

// --- Stop conditions ---

#[tokio::test]
async fn test_constant_oracle_stops_early_with_its_steps() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let oracle = Constant::new(TWO_STEPS);
    let config = test_config();
    let window = config.stability_window;
    let outcome = controller(oracle.clone(), config).solve("Solve x + 1 = 3", 128).await?;

    assert_ne!(outcome.termination, Termination::MaxIterations);
    assert!(outcome.iterations_used <= window + 1, "used {}", outcome.iterations_used);
    assert_eq!(outcome.final_solution, "Let x = 2. Then x + 1 = 3.");
    assert_eq!(outcome.step_texts(), vec!["Let x = 2.", "Then x + 1 = 3."]);
    // With the default gate the state fidelity settles one pass before the
    // text window fills.
    assert_eq!(outcome.termination, Termination::Converged);
    assert_eq!(outcome.iterations_used, 4);
    assert_eq!(outcome.convergence_history.len(), 8);
    assert!(outcome.convergence_history.iter().all(|f| (f - 1.0).abs() < 1e-9));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1 + 2 * 4);
    Ok(())
}

#[tokio::test]
async fn test_constant_oracle_reaches_stable_stop_without_fidelity_gate() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let oracle = Constant::new(TWO_STEPS);
    let config = SolverConfig { convergence_threshold: 1.0, max_iterations: 10, ..test_config() };
    let outcome = controller(oracle.clone(), config).solve("Solve x + 1 = 3", 128).await?;

    assert_eq!(outcome.termination, Termination::Stable);
    // Stable on passes 2, 3 and 4 (0-based); the stop fires before pass 4 refines.
    assert_eq!(outcome.iterations_used, 4);
    assert_eq!(outcome.final_solution, "Let x = 2. Then x + 1 = 3.");
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1 + 2 * 4);
    Ok(())
}

#[tokio::test]
async fn test_random_oracle_runs_to_max_iterations() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = test_config();
    let max = config.max_iterations;
    let outcome = controller(Random::seeded(7), config).solve("Compute a and b", 128).await?;

    assert_eq!(outcome.termination, Termination::MaxIterations);
    assert_eq!(outcome.iterations_used, max);
    assert_eq!(outcome.convergence_history.len(), 2 * max);
    assert_eq!(outcome.steps.len(), 2);
    assert_eq!(outcome.complexity_scores.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_faithful_mode_keeps_initial_steps() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let oracle = Scripted::new(TWO_STEPS, Reply::Text("Step 1: Let x = 7. Step 2: Then x + 1 = 8.".to_string()));
    let config = SolverConfig { carry_forward: false, ..test_config() };
    let outcome = controller(oracle, config).solve("Solve x + 1 = 3", 128).await?;

    assert_eq!(outcome.step_texts(), vec!["Let x = 2.", "Then x + 1 = 3."]);
    assert_ne!(outcome.termination, Termination::MaxIterations);
    Ok(())
}

#[tokio::test]
async fn test_carry_forward_adopts_improved_steps() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let oracle = Scripted::new(TWO_STEPS, Reply::Text("Step 1: Let x = 7. Step 2: Then x + 1 = 8.".to_string()));
    let outcome = controller(oracle, test_config()).solve("Solve x + 1 = 3", 128).await?;

    assert_eq!(outcome.step_texts(), vec!["Let x = 7.", "Then x + 1 = 8."]);
    Ok(())
}

// --- Failures ---

#[tokio::test]
async fn test_settled_steps_keep_their_current_text() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let recorder = Arc::new(Recording::default());
    let config = SolverConfig { max_iterations: 10, ..test_config() };
    let outcome = ReflectionController::new(Arc::new(Echo), Arc::new(DigitsOnly), config)?
        .with_observer(recorder.clone())
        .solve("Solve x + 1 = 3", 64)
        .await?;

    // Pass 0 adopts the echoed text; from pass 1 the fidelity window is full
    // of 1.0 and both steps settle, so the extra " ok" is never adopted again.
    assert_eq!(outcome.step_texts(), vec!["Let x = 2. ok", "Then x + 1 = 3. ok"]);
    assert_ne!(outcome.termination, Termination::MaxIterations);
    assert!(outcome.convergence_history.iter().all(|f| (f - 1.0).abs() < 1e-9));

    let converged = recorder.converged.lock().map(|c| c.clone()).unwrap_or_default();
    assert!(converged.contains(&(1, 1)), "{:?}", converged);
    assert!(converged.contains(&(1, 2)), "{:?}", converged);
    assert!(!converged.iter().any(|&(iteration, _)| iteration == 0));
    Ok(())
}

#[tokio::test]
async fn test_initial_response_without_markers_fails() {
    init_tracing();
    let oracle = Constant::new("The answer is 4.");
    let err = controller(oracle, test_config()).solve("2 + 2", 64).await.expect_err("no steps to refine");

    assert_eq!(err.component, Component::InitialGeneration);
    assert_eq!(err.iteration, None);
    assert!(matches!(err.source, RefineError::Extraction { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_initial_timeout_aborts_solve() {
    init_tracing();
    let config = SolverConfig { oracle_timeout_ms: 20, ..test_config() };
    let err = controller(Arc::new(Hanging), config).solve("anything", 64).await.expect_err("oracle hangs");

    assert_eq!(err.component, Component::InitialGeneration);
    assert_eq!(err.iteration, None);
    assert_eq!(err.source, RefineError::Oracle(OracleError::Timeout { after: Duration::from_millis(20) }));
}

#[tokio::test]
async fn test_blank_initial_response_fails() {
    init_tracing();
    let err = controller(Constant::new(" \n"), test_config()).solve("anything", 64).await.expect_err("blank response");

    assert_eq!(err.component, Component::InitialGeneration);
    assert_eq!(err.source, RefineError::Oracle(OracleError::EmptyResponse));
}

#[tokio::test]
async fn test_refinement_timeout_reports_iteration() {
    init_tracing();
    let oracle = Scripted::new(TWO_STEPS, Reply::Hang);
    let config = SolverConfig { oracle_timeout_ms: 20, ..test_config() };
    let err = controller(oracle, config).solve("Solve x + 1 = 3", 64).await.expect_err("refinement hangs");

    assert_eq!(err.component, Component::Reflection);
    assert_eq!(err.iteration, Some(0));
    assert_eq!(err.source, RefineError::Oracle(OracleError::Timeout { after: Duration::from_millis(20) }));
    assert!(err.source.is_transient());
}

#[tokio::test]
async fn test_blank_refinement_is_an_oracle_error() {
    init_tracing();
    let oracle = Scripted::new(TWO_STEPS, Reply::Text("  \n ".to_string()));
    let err = controller(oracle, test_config()).solve("Solve x + 1 = 3", 64).await.expect_err("blank refinement");

    assert_eq!(err.component, Component::Reflection);
    assert_eq!(err.iteration, Some(0));
    assert_eq!(err.source, RefineError::Oracle(OracleError::EmptyResponse));
}

#[tokio::test]
async fn test_step_without_tokens_aborts_in_encoding() {
    init_tracing();
    let oracle = Constant::new("Step 1: Let x = 2. Step 2: EMPTY");
    let recorder = Arc::new(Recording::default());
    let err = ReflectionController::new(oracle, Arc::new(Blank), test_config())
        .expect("valid test configuration")
        .with_observer(recorder.clone())
        .solve("Solve x + 1 = 3", 64)
        .await
        .expect_err("second step has no tokens");

    assert_eq!(err.component, Component::Encoding);
    assert_eq!(err.iteration, Some(0));
    assert!(matches!(err.source, RefineError::Encoding { .. }), "{:?}", err);

    let events = recorder.events();
    assert_eq!(events.last().map(String::as_str), Some("abort encoding"));
    assert!(!events.iter().any(|e| e.starts_with("terminate")));
    assert!(!events.iter().any(|e| e.starts_with("end")));
}

#[test]
fn test_invalid_configuration_rejected() {
    let config = SolverConfig { stability_window: 0, ..test_config() };
    let result = ReflectionController::new(Constant::new(TWO_STEPS), Arc::new(ByteTokenizer), config);
    assert!(matches!(result, Err(RefineError::InvalidConfig { .. })));
}

#[test]
fn test_evolver_dimension_must_match() -> Result<(), RefineError> {
    let result = ReflectionController::with_evolver(
        Constant::new(TWO_STEPS),
        Arc::new(ByteTokenizer),
        test_config(),
        Evolver::new(8)?,
    );
    assert!(matches!(result, Err(RefineError::DimensionMismatch { expected: 16, found: 8 })));
    Ok(())
}

// --- Collaborators ---

#[tokio::test]
async fn test_unlabeled_refinement_kept_as_raw_text() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let oracle = Scripted::new(TWO_STEPS, Reply::Text("Let x = 2, checked.".to_string()));
    let recorder = Arc::new(Recording::default());
    let config = SolverConfig { max_iterations: 1, ..test_config() };
    let outcome = controller(oracle, config).with_observer(recorder.clone()).solve("Solve x + 1 = 3", 64).await?;

    assert_eq!(outcome.step_texts(), vec!["Let x = 2, checked.", "Let x = 2, checked."]);
    let refinements = recorder.refinements.lock().map(|r| r.clone()).unwrap_or_default();
    assert_eq!(refinements.len(), 2);
    assert!(refinements.iter().all(|r| r.source == ImprovedStepSource::Unlabeled));
    Ok(())
}

#[tokio::test]
async fn test_observer_sees_events_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = Arc::new(Recording::default());
    let config = SolverConfig { max_iterations: 2, ..test_config() };
    controller(Random::seeded(1), config).with_observer(recorder.clone()).solve("p", 64).await?;

    assert_eq!(
        recorder.events(),
        vec![
            "start",
            "initial 2",
            "iteration 0",
            "refined 1",
            "refined 2",
            "end 0",
            "iteration 1",
            "refined 1",
            "refined 2",
            "end 1",
            "terminate max iterations",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_custom_fingerprint_policy_drives_stability() -> Result<(), Box<dyn std::error::Error>> {
    struct Blind;
    impl FingerprintPolicy for Blind {
        fn fingerprint(&self, _text: &str) -> BTreeSet<String> {
            BTreeSet::new()
        }
    }

    let config = SolverConfig { convergence_threshold: 1.0, max_iterations: 10, ..test_config() };
    let outcome = controller(Random::seeded(3), config)
        .with_fingerprint_policy(Arc::new(Blind))
        .solve("Compute a and b", 64)
        .await?;

    assert_eq!(outcome.termination, Termination::Stable);
    assert_eq!(outcome.iterations_used, 4);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_solves_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
    let cache = HamiltonianCache::new();
    let shared = Arc::new(ReflectionController::with_cache(
        Constant::new(TWO_STEPS),
        Arc::new(ByteTokenizer),
        test_config(),
        &cache,
    )?);
    let _second = ReflectionController::with_cache(Constant::new(TWO_STEPS), Arc::new(ByteTokenizer), test_config(), &cache)?;
    assert_eq!(cache.len(), 1);

    let (a, b) = tokio::join!(shared.solve("Solve x + 1 = 3", 64), shared.solve("Solve x + 1 = 3", 64));
    let (a, b) = (a?, b?);
    assert_eq!(a.iterations_used, b.iterations_used);
    assert_eq!(a.convergence_history, b.convergence_history);
    assert_eq!(a.termination, b.termination);
    Ok(())
}

#[test]
fn test_controllers_share_propagator_per_dimension() -> Result<(), RefineError> {
    let config = SolverConfig { dimension: 12, ..test_config() };
    let a = ReflectionController::new(Constant::new(TWO_STEPS), Arc::new(ByteTokenizer), config.clone())?;
    let b = ReflectionController::new(Constant::new(TWO_STEPS), Arc::new(ByteTokenizer), config)?;
    assert!(std::ptr::eq(a.evolver().propagator(), b.evolver().propagator()));
    Ok(())
}

#[tokio::test]
async fn test_integrate_merges_finished_steps() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let outcome = controller(Constant::new(TWO_STEPS), test_config()).solve("Solve x + 1 = 3", 64).await?;

    let oracle = Arc::new(Capturing { reply: "  x = 2, so x + 1 = 3.\n".to_string(), last_prompt: Mutex::new(String::new()) });
    let merged = controller(oracle.clone(), test_config()).integrate(&outcome, 64).await?;

    assert_eq!(merged, "x = 2, so x + 1 = 3.");
    let prompt = oracle.last_prompt.lock().map(|p| p.clone()).unwrap_or_default();
    assert!(prompt.contains("Step 1: Let x = 2.\n\nStep 2: Then x + 1 = 3."), "{}", prompt);
    assert!(prompt.contains("Coherence Measure: "));
    Ok(())
}

#[tokio::test]
async fn test_blank_integration_reply_fails() -> Result<(), Box<dyn std::error::Error>> {
    let outcome = controller(Constant::new(TWO_STEPS), test_config()).solve("Solve x + 1 = 3", 64).await?;
    let oracle = Arc::new(Capturing { reply: "\n".to_string(), last_prompt: Mutex::new(String::new()) });
    let err = controller(oracle, test_config()).integrate(&outcome, 64).await.expect_err("blank reply");

    assert_eq!(err.component, Component::Integration);
    assert_eq!(err.iteration, None);
    assert_eq!(err.source, RefineError::Oracle(OracleError::EmptyResponse));
    Ok(())
}
