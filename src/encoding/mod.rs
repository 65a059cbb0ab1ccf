// src/encoding/mod.rs

//! Deterministic text to state encoding.
//!
//! Text is tokenized by an external [`Tokenizer`], each of the first `D`
//! token ids becomes an amplitude `t / vocab_size` carrying the phase
//! `e^(2πi·i/D)` of its position, and the resulting vector is normalized.

use num_complex::Complex;
use num_traits::Zero;

use crate::core::{QuantumState, RefineError, PI};

/// Turns text into a sequence of non-negative token ids.
///
/// The tokenizer belongs to the model being driven; the encoder only needs
/// the ids and the size of the vocabulary they are drawn from.
pub trait Tokenizer: Send + Sync {
    /// Token ids for `text`, in order.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Number of distinct ids; every id returned by `encode` is below it.
    fn vocab_size(&self) -> usize;
}

/// Byte-level tokenizer: every UTF-8 byte is its own id, vocabulary 256.
///
/// Useful when no model tokenizer is available and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.bytes().map(u32::from).collect()
    }

    fn vocab_size(&self) -> usize {
        256
    }
}

/// Maps token ids into a unit-norm [`QuantumState`] of fixed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEncoder {
    dimension: usize,
}

impl StateEncoder {
    /// Creates an encoder for dimension `dimension`.
    ///
    /// # Returns
    /// * `Err(RefineError::InvalidConfig)` if `dimension` is zero.
    pub fn new(dimension: usize) -> Result<Self, RefineError> {
        if dimension == 0 {
            return Err(RefineError::InvalidConfig {
                message: "state dimension must be at least 1".to_string(),
            });
        }
        Ok(Self { dimension })
    }

    /// Dimension D of the states produced.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Tokenizes `text` and encodes the ids.
    pub fn encode_text(&self, tokenizer: &dyn Tokenizer, text: &str) -> Result<QuantumState, RefineError> {
        let tokens = tokenizer.encode(text);
        self.encode_tokens(&tokens, tokenizer.vocab_size())
    }

    /// Encodes a token sequence.
    ///
    /// Only the first `D` tokens are used. A slot is addressed by `i mod D`, so
    /// a longer sequence would overwrite earlier slots of the same residue.
    ///
    /// # Returns
    /// * `Err(RefineError::Encoding)` for an empty sequence, a zero vocabulary,
    ///   or ids that are all zero (nothing to normalize).
    pub fn encode_tokens(&self, tokens: &[u32], vocab_size: usize) -> Result<QuantumState, RefineError> {
        if tokens.is_empty() {
            return Err(RefineError::Encoding {
                message: "token sequence is empty".to_string(),
            });
        }
        if vocab_size == 0 {
            return Err(RefineError::Encoding {
                message: "vocabulary size is zero".to_string(),
            });
        }

        let dim = self.dimension;
        let mut features = vec![Complex::zero(); dim];
        for (i, &token) in tokens.iter().take(dim).enumerate() {
            let amplitude = f64::from(token) / vocab_size as f64;
            let phase = Complex::from_polar(1.0, 2.0 * PI * (i as f64 / dim as f64));
            features[i % dim] = phase * amplitude;
        }

        QuantumState::normalized(features).map_err(|e| match e {
            RefineError::Encoding { message } => RefineError::Encoding {
                message: format!("degenerate token sequence of length {}: {}", tokens.len(), message),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_regression_fixture_dimension_8() -> Result<(), RefineError> {
        // ids [2, 5, 1], vocab 10 -> amplitudes 0.2, 0.5, 0.1 at phases 0, π/4, π/2
        let encoder = StateEncoder::new(8)?;
        let state = encoder.encode_tokens(&[2, 5, 1], 10)?;

        let norm = (0.2_f64 * 0.2 + 0.5 * 0.5 + 0.1 * 0.1).sqrt();
        let expected = [
            Complex::from_polar(0.2 / norm, 0.0),
            Complex::from_polar(0.5 / norm, PI / 4.0),
            Complex::from_polar(0.1 / norm, PI / 2.0),
        ];

        assert_eq!(state.dim(), 8);
        for (i, e) in expected.iter().enumerate() {
            assert!((state.vector()[i] - e).norm() < TEST_TOLERANCE, "slot {}: {} vs {}", i, state.vector()[i], e);
        }
        for c in &state.vector()[3..] {
            assert!(c.norm() < TEST_TOLERANCE);
        }
        assert!((state.norm() - 1.0).abs() < TEST_TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_tokens_beyond_dimension_are_ignored() -> Result<(), RefineError> {
        let encoder = StateEncoder::new(2)?;
        let short = encoder.encode_tokens(&[3, 4], 10)?;
        let long = encoder.encode_tokens(&[3, 4, 9, 9, 9], 10)?;
        assert_eq!(short, long);
        Ok(())
    }

    #[test]
    fn test_empty_text_is_an_encoding_error() -> Result<(), RefineError> {
        let encoder = StateEncoder::new(8)?;
        let result = encoder.encode_text(&ByteTokenizer, "");
        assert!(matches!(result, Err(RefineError::Encoding { .. })));
        Ok(())
    }

    #[test]
    fn test_all_zero_ids_are_degenerate() -> Result<(), RefineError> {
        let encoder = StateEncoder::new(4)?;
        assert!(matches!(encoder.encode_tokens(&[0, 0, 0], 10), Err(RefineError::Encoding { .. })));
        assert!(matches!(encoder.encode_tokens(&[1], 0), Err(RefineError::Encoding { .. })));
        Ok(())
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(StateEncoder::new(0), Err(RefineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_byte_tokenizer() {
        assert_eq!(ByteTokenizer.encode("Ab"), vec![65, 98]);
        assert_eq!(ByteTokenizer.vocab_size(), 256);
    }
}
