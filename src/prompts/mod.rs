// src/prompts/mod.rs

//! Instruction text sent to the oracle.
//!
//! The controller only depends on [`PromptTemplates`]; [`DefaultPrompts`]
//! provides numbered-step instructions plus optional domain guidance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::RefineError;
use crate::steps::Step;

const BASE_INSTRUCTIONS: &str = "You are a precise mathematical problem solver. When solving problems:

1. Break down the solution into clearly numbered steps
2. Format each step as:
   Step N: [Brief title]
   [Detailed mathematical work]
   ∴ [Conclusion of this step]
3. Use rigorous mathematical notation
4. Justify each significant step
5. Highlight key insights with '→ Insight:'
6. End with a clearly stated conclusion

For each step:
- Show all work clearly
- Explain why the step is needed
- Note any assumptions made
- Highlight potential pitfalls";

/// Mathematical subfield whose guidelines are appended to the instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Factorization, equations, substitution checks.
    Algebra,
    /// Differentiation, integration, extrema.
    Calculus,
    /// Primes, modular arithmetic, divisibility.
    NumberTheory,
    /// Theorems, angles, triangle inequalities.
    Geometry,
}

impl Domain {
    /// Guidance appended to the base instructions.
    pub fn guidelines(&self) -> &'static str {
        match self {
            Domain::Algebra => "Additional Guidelines for Algebra:
- State all variable definitions clearly
- Show complete factorization steps
- Identify special patterns (perfect squares, difference of squares, etc.)
- Verify solutions by substitution when applicable",
            Domain::Calculus => "Additional Guidelines for Calculus:
- State all differentiation and integration rules used
- Show intermediate steps in chain rule applications
- Verify critical points and extrema
- Include domain and range analysis",
            Domain::NumberTheory => "Additional Guidelines for Number Theory:
- State all theorems used
- Show complete prime factorizations when relevant
- Provide clear modular arithmetic calculations
- Include divisibility analysis when appropriate",
            Domain::Geometry => "Additional Guidelines for Geometry:
- Include clear diagrams when needed
- State all theorems and postulates used
- Show angle calculations explicitly
- Verify triangle inequalities when applicable",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Algebra => "algebra",
            Domain::Calculus => "calculus",
            Domain::NumberTheory => "number_theory",
            Domain::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

impl FromStr for Domain {
    type Err = RefineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "algebra" => Ok(Domain::Algebra),
            "calculus" => Ok(Domain::Calculus),
            "number_theory" => Ok(Domain::NumberTheory),
            "geometry" => Ok(Domain::Geometry),
            other => Err(RefineError::InvalidConfig { message: format!("unknown domain '{}'", other) }),
        }
    }
}

/// Everything a reflection prompt may mention about the step under review.
#[derive(Debug, Clone, Copy)]
pub struct ReflectionContext<'a> {
    /// Step body.
    pub step: &'a str,
    /// 1-based position in the solution.
    pub position: usize,
    /// Total number of steps.
    pub total: usize,
    /// Mean amplitude of the step's evolved state.
    pub certainty: f64,
    /// Heuristic complexity of the step, see `steps::step_complexity`.
    pub complexity: f64,
}

/// Builds oracle prompts.
pub trait PromptTemplates: Send + Sync {
    /// Prompt for the initial full solution.
    fn initial_prompt(&self, problem: &str) -> String;

    /// Prompt asking for an improved version of one step.
    fn reflection_prompt(&self, context: &ReflectionContext<'_>) -> String;

    /// Prompt asking for one integrated solution from finished steps.
    /// `coherence` is the mean amplitude of the joined steps' state.
    fn integration_prompt(&self, steps: &[Step], coherence: f64) -> String;
}

/// Numbered-step instructions with optional domain guidance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPrompts {
    system_prompt: String,
    domain: Option<Domain>,
}

impl DefaultPrompts {
    /// Instructions for `domain`, or the base instructions alone.
    pub fn new(domain: Option<Domain>) -> Self {
        let mut system_prompt = BASE_INSTRUCTIONS.to_string();
        if let Some(d) = domain {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(d.guidelines());
        }
        Self { system_prompt, domain }
    }

    /// The instructions prefixed to every prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Domain the instructions were built for.
    pub fn domain(&self) -> Option<Domain> {
        self.domain
    }
}

impl Default for DefaultPrompts {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PromptTemplates for DefaultPrompts {
    fn initial_prompt(&self, problem: &str) -> String {
        format!("{}\n\nProblem to solve:\n{}", self.system_prompt, problem)
    }

    fn reflection_prompt(&self, context: &ReflectionContext<'_>) -> String {
        format!(
            "{system}

Please analyze and improve Step {position} of {total}:

Current Step:
{step}

Consider:
1. Is the mathematical reasoning complete and rigorous?
2. Are calculations shown clearly and correctly?
3. Are edge cases and conditions addressed?
4. Could the explanation be more precise?
5. Is this step necessary and well-connected to others?

Analysis Metrics:
- Step Complexity: {complexity:.2}
- Quantum Certainty: {certainty:.2}

Provide an improved version of this step:
Step {position}: ",
            system = self.system_prompt,
            position = context.position,
            total = context.total,
            step = context.step,
            complexity = context.complexity,
            certainty = context.certainty,
        )
    }

    fn integration_prompt(&self, steps: &[Step], coherence: f64) -> String {
        let steps_text = steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("Step {}: {}", i + 1, step.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "{system}

Review these solution steps:

{steps_text}

Consider:
1. Logical flow between steps
2. Completeness of reasoning
3. Clarity of progression
4. Supporting evidence for conclusions
5. Overall solution coherence

Coherence Measure: {coherence:.2}

Provide an improved integrated solution:
",
            system = self.system_prompt,
        )
    }
}
