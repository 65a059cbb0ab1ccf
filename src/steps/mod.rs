// src/steps/mod.rs

//! Splitting oracle responses into numbered solution steps.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

static STEP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Step (\d+)[:.](?:\s+|$)").expect("valid step marker regex"));
static COMPLEXITY_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+\-*/^√∑∏∫∂θπ=≠≤≥∈∉⊆⊂∪∩]").expect("valid symbol regex"));
static EQUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^=]=[^=]").expect("valid equation regex"));

/// One numbered fragment of a solution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Step {
    /// Number as labelled in the text (`Step N:`), or the 1-based position
    /// for steps that carried no label.
    pub number: usize,
    /// Step body with the marker removed and whitespace trimmed.
    pub text: String,
}

impl Step {
    /// Creates a step.
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self { number, text: text.into() }
    }

    /// First line of the body, conventionally a short title.
    pub fn title(&self) -> &str {
        self.text.lines().next().unwrap_or("").trim()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.number, self.text)
    }
}

/// Ordered steps forming the candidate answer at one point in time.
/// Replaced wholesale each iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionState {
    steps: Vec<Step>,
}

impl SolutionState {
    /// Wraps an ordered list of steps.
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Parses the steps of an oracle response.
    pub fn from_response(response: &str) -> Self {
        Self::new(extract_numbered_steps(response))
    }

    /// The steps, in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Consumes the state, returning its steps.
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step bodies joined by a single space: the text the stability
    /// tracker compares.
    pub fn joined(&self) -> String {
        self.steps.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ")
    }
}

/// Splits `response` on `Step N:` / `Step N.` markers.
///
/// Text before the first marker is discarded, each body is trimmed, and
/// empty bodies are dropped. No marker yields an empty list.
pub fn extract_numbered_steps(response: &str) -> Vec<Step> {
    let markers: Vec<(usize, usize, usize)> = STEP_MARKER
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse::<usize>().unwrap_or(0);
            Some((whole.start(), whole.end(), number))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .filter_map(|(i, &(_, body_start, number))| {
            let body_end = markers.get(i + 1).map(|m| m.0).unwrap_or(response.len());
            let body = response[body_start..body_end].trim();
            (!body.is_empty()).then(|| Step::new(number, body))
        })
        .collect()
}

/// Step bodies of `response`, in order. See [`extract_numbered_steps`].
pub fn extract_steps(response: &str) -> Vec<String> {
    extract_numbered_steps(response).into_iter().map(|s| s.text).collect()
}

/// How an improved step was recovered from a refinement response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImprovedStepSource {
    /// The response labelled a step with the requested number.
    Matched,
    /// Markers were present but none matched; the first step was taken.
    FirstLabelled,
    /// No markers at all; the whole response stands as one unlabeled step.
    Unlabeled,
}

/// Picks the improved version of step `number` out of a refinement response.
///
/// Returns `None` only when the response is blank.
pub fn select_improved_step(response: &str, number: usize) -> Option<(String, ImprovedStepSource)> {
    let steps = extract_numbered_steps(response);
    if let Some(step) = steps.iter().find(|s| s.number == number) {
        return Some((step.text.clone(), ImprovedStepSource::Matched));
    }
    if let Some(step) = steps.into_iter().next() {
        return Some((step.text, ImprovedStepSource::FirstLabelled));
    }
    let raw = response.trim();
    (!raw.is_empty()).then(|| (raw.to_string(), ImprovedStepSource::Unlabeled))
}

/// Heuristic mathematical density of a step, in `[0.1, 1.0]`.
///
/// Weighs operator symbols and equations at 0.4 each and distinct Latin
/// letters (variables) at 0.2, scaled down by 100.
pub fn step_complexity(step: &str) -> f64 {
    let symbols = COMPLEXITY_SYMBOL.find_iter(step).count() as f64;
    let equations = EQUATION.find_iter(step).count() as f64;
    let variables = step
        .chars()
        .filter(char::is_ascii_alphabetic)
        .collect::<HashSet<_>>()
        .len() as f64;
    let complexity = (symbols * 0.4 + equations * 0.4 + variables * 0.2) / 100.0;
    complexity.clamp(0.1, 1.0)
}
