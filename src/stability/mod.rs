// src/stability/mod.rs

//! Sliding-window detection of a solution text that has stopped changing.
//!
//! Each text is reduced to a fingerprint set by a [`FingerprintPolicy`];
//! the window is stable when every adjacent pair of fingerprints differs by
//! less than the instability threshold.

use regex::Regex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, LazyLock};

use crate::core::{RefineError, STABILITY_THRESHOLD, STABILITY_WINDOW};

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d*\.?\d+").expect("valid number regex"));
static MATH_TERM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[α-ω+*/^{}\[\]\-]+").expect("valid math term regex"));

/// Reduces a solution text to a set of tokens used to compare revisions.
pub trait FingerprintPolicy: Send + Sync {
    /// Fingerprint of `text`.
    fn fingerprint(&self, text: &str) -> BTreeSet<String>;
}

/// Numeric literals plus runs of Greek letters and operator symbols.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalFingerprint;

impl FingerprintPolicy for LexicalFingerprint {
    fn fingerprint(&self, text: &str) -> BTreeSet<String> {
        NUMBER_PATTERN
            .find_iter(text)
            .chain(MATH_TERM_PATTERN.find_iter(text))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// `|a △ b| / max(|b|, 1)`, where `b` is the newer fingerprint.
pub fn instability(older: &BTreeSet<String>, newer: &BTreeSet<String>) -> f64 {
    let changed = older.symmetric_difference(newer).count();
    changed as f64 / newer.len().max(1) as f64
}

/// Bounded FIFO of recent solution texts.
#[derive(Clone)]
pub struct StabilityTracker {
    window: VecDeque<String>,
    capacity: usize,
    threshold: f64,
    policy: Arc<dyn FingerprintPolicy>,
}

impl StabilityTracker {
    /// Tracker with window `capacity`, instability `threshold` and the
    /// lexical fingerprint.
    pub fn new(capacity: usize, threshold: f64) -> Result<Self, RefineError> {
        Self::with_policy(capacity, threshold, Arc::new(LexicalFingerprint))
    }

    /// Tracker using a custom fingerprint policy.
    pub fn with_policy(
        capacity: usize,
        threshold: f64,
        policy: Arc<dyn FingerprintPolicy>,
    ) -> Result<Self, RefineError> {
        if capacity == 0 {
            return Err(RefineError::InvalidConfig {
                message: "stability window must hold at least one entry".to_string(),
            });
        }
        Ok(Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
            threshold,
            policy,
        })
    }

    /// Pushes `solution_text` and reports whether the window is stable.
    ///
    /// Returns `false` until the window holds `capacity` texts. The window is
    /// trimmed back to `capacity` after each evaluation.
    pub fn update(&mut self, solution_text: &str) -> bool {
        self.window.push_back(solution_text.to_string());
        if self.window.len() < self.capacity {
            return false;
        }

        let start = self.window.len() - self.capacity;
        let fingerprints: Vec<BTreeSet<String>> = self
            .window
            .iter()
            .skip(start)
            .map(|text| self.policy.fingerprint(text))
            .collect();
        let is_stable = fingerprints
            .windows(2)
            .all(|pair| instability(&pair[0], &pair[1]) < self.threshold);

        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        is_stable
    }

    /// Swaps the fingerprint policy, keeping capacity and threshold.
    pub fn with_fingerprint(mut self, policy: Arc<dyn FingerprintPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Number of texts currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Returns `true` if no text has been pushed since the last reset.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Window capacity W.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for StabilityTracker {
    fn default() -> Self {
        Self {
            window: VecDeque::with_capacity(STABILITY_WINDOW + 1),
            capacity: STABILITY_WINDOW,
            threshold: STABILITY_THRESHOLD,
            policy: Arc::new(LexicalFingerprint),
        }
    }
}

impl std::fmt::Debug for StabilityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StabilityTracker")
            .field("window", &self.window)
            .field("capacity", &self.capacity)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
