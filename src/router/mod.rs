//! Context-length routing
//!
//! Maps a requested alias to a concrete backend model by comparing the estimated
//! prompt size against per-model context-length buckets.

pub mod tokens;

pub use tokens::{Encoding, TokenEstimator};

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// A (context length, target model) pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Bucket {
    pub context_length: u64,
    pub model: String,
}

impl Bucket {
    /// Create a new bucket
    pub fn new(context_length: u64, model: impl Into<String>) -> Self {
        Self {
            context_length,
            model: model.into(),
        }
    }
}

/// Routing rule for one alias
///
/// Fields are private and only reachable through [`RoutingRule::new`] (or
/// deserialization, which calls it), so a constructed rule always has at least one
/// bucket, unique ascending context lengths, and a threshold in (0, 1].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawRoutingRule", into = "RawRoutingRule")]
pub struct RoutingRule {
    buckets: Vec<Bucket>,
    threshold: f64,
}

#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawRoutingRule {
    threshold: f64,
    buckets: Vec<Bucket>,
}

impl TryFrom<RawRoutingRule> for RoutingRule {
    type Error = AppError;

    fn try_from(raw: RawRoutingRule) -> Result<Self, Self::Error> {
        RoutingRule::new(raw.buckets, raw.threshold)
    }
}

impl From<RoutingRule> for RawRoutingRule {
    fn from(rule: RoutingRule) -> Self {
        Self {
            threshold: rule.threshold,
            buckets: rule.buckets,
        }
    }
}

impl RoutingRule {
    /// Create a validated routing rule
    ///
    /// Buckets may be given in any order; they are stored ascending by context
    /// length.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the bucket list is empty, a context length is
    /// zero or repeated, a target model is blank, or the threshold is not a finite
    /// number in (0, 1].
    pub fn new(mut buckets: Vec<Bucket>, threshold: f64) -> AppResult<Self> {
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(AppError::Config(format!(
                "threshold must be a finite number in (0, 1], got {}",
                threshold
            )));
        }
        if buckets.is_empty() {
            return Err(AppError::Config(
                "routing rule must define at least one bucket".to_string(),
            ));
        }

        buckets.sort_by_key(|b| b.context_length);

        for bucket in &buckets {
            if bucket.context_length == 0 {
                return Err(AppError::Config(format!(
                    "bucket for model '{}' has context_length 0",
                    bucket.model
                )));
            }
            if bucket.model.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "bucket with context_length {} has an empty model name",
                    bucket.context_length
                )));
            }
        }
        if let Some(pair) = buckets
            .windows(2)
            .find(|pair| pair[0].context_length == pair[1].context_length)
        {
            return Err(AppError::Config(format!(
                "duplicate context_length {} in routing buckets",
                pair[0].context_length
            )));
        }

        Ok(Self { buckets, threshold })
    }

    /// Buckets in ascending context-length order
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Fraction of each bucket's context length treated as usable capacity
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Select the bucket for an estimated prompt size
    ///
    /// Returns the smallest bucket with `estimated_tokens <= context_length *
    /// threshold`. Oversized prompts are never rejected: if no bucket fits, the
    /// largest one is returned.
    pub fn select(&self, estimated_tokens: usize) -> &Bucket {
        let tokens = estimated_tokens as f64;
        self.buckets
            .iter()
            .find(|bucket| tokens <= bucket.context_length as f64 * self.threshold)
            .unwrap_or_else(|| self.largest())
    }

    /// Target model name for an estimated prompt size
    pub fn resolve(&self, estimated_tokens: usize) -> &str {
        &self.select(estimated_tokens).model
    }

    fn largest(&self) -> &Bucket {
        // Non-empty by construction
        &self.buckets[self.buckets.len() - 1]
    }
}

/// Result of a routing decision
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    /// Alias the client asked for
    pub alias: String,
    /// Concrete backend model that replaces the alias
    pub target: String,
    /// Token estimate the decision was based on
    pub estimated_tokens: usize,
    /// Context length of the selected bucket
    pub context_length: u64,
    /// True when no bucket fit and the largest one was used
    pub overflowed: bool,
}

impl RoutingDecision {
    /// Evaluate `rule` for `alias` at the given prompt size
    pub fn evaluate(alias: &str, rule: &RoutingRule, estimated_tokens: usize) -> Self {
        let bucket = rule.select(estimated_tokens);
        let overflowed =
            estimated_tokens as f64 > bucket.context_length as f64 * rule.threshold();
        Self {
            alias: alias.to_string(),
            target: bucket.model.clone(),
            estimated_tokens,
            context_length: bucket.context_length,
            overflowed,
        }
    }
}
