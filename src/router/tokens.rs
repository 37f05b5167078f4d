//! Prompt token estimation
//!
//! Two fixed encodings are available:
//!
//! - `cl100k_base`: exact BPE token count for the cl100k_base vocabulary
//!   (GPT-3.5/GPT-4 family), via `tiktoken-rs`. Special-token markers in user
//!   text are counted as ordinary text.
//! - `chars_div_4`: Unicode scalar count divided by four, rounded down.
//!
//! Parity with a backend's own tokenizer is not required; the estimate only has to
//! be stable so that routing thresholds behave predictably.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Token encoding used for routing estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    #[serde(rename = "chars_div_4")]
    CharsDiv4,
}

impl Encoding {
    /// Name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cl100kBase => "cl100k_base",
            Self::CharsDiv4 => "chars_div_4",
        }
    }
}

#[derive(Clone)]
enum Backend {
    Bpe(Arc<CoreBPE>),
    CharsDiv4,
}

/// Deterministic token estimator, cheap to clone and safe to share across requests
#[derive(Clone)]
pub struct TokenEstimator {
    encoding: Encoding,
    backend: Backend,
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl TokenEstimator {
    /// Build an estimator for the given encoding
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the BPE vocabulary cannot be loaded.
    pub fn new(encoding: Encoding) -> AppResult<Self> {
        let backend = match encoding {
            Encoding::Cl100kBase => {
                let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
                    AppError::Config(format!("failed to load cl100k_base encoding: {}", e))
                })?;
                Backend::Bpe(Arc::new(bpe))
            }
            Encoding::CharsDiv4 => Backend::CharsDiv4,
        };
        Ok(Self { encoding, backend })
    }

    /// Encoding this estimator uses
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Estimate the number of tokens in `text`
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.backend {
            Backend::Bpe(bpe) => bpe.encode_ordinary(text).len(),
            Backend::CharsDiv4 => text.chars().count() / 4,
        }
    }
}
