//! Declarative request rewriting
//!
//! A [`RewriteRule`] is applied in a fixed order:
//!
//! 1. `overrides`, sequentially, onto top-level fields (last write wins)
//! 2. `messages`, prepended ahead of the client's messages in rule order
//! 3. `tools`, appended to the top-level `tools` list (created if absent)
//!
//! Existing messages and tools are never removed or reordered.

use crate::error::{AppError, AppResult};
use crate::types::{ChatMessage, ChatRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields that can only be extended, never overridden
const RESERVED_FIELDS: [&str; 2] = ["messages", "tools"];

/// A single `field = value` override
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldOverride {
    pub field: String,
    pub value: Value,
}

impl FieldOverride {
    /// Create a new override
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// Rewrite rule for one alias
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(try_from = "RawRewriteRule", into = "RawRewriteRule")]
pub struct RewriteRule {
    overrides: Vec<FieldOverride>,
    messages: Vec<ChatMessage>,
    tools: Vec<Value>,
}

#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawRewriteRule {
    #[serde(default)]
    overrides: Vec<FieldOverride>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    tools: Vec<Value>,
}

impl TryFrom<RawRewriteRule> for RewriteRule {
    type Error = AppError;

    fn try_from(raw: RawRewriteRule) -> Result<Self, Self::Error> {
        RewriteRule::new(raw.overrides, raw.messages, raw.tools)
    }
}

impl From<RewriteRule> for RawRewriteRule {
    fn from(rule: RewriteRule) -> Self {
        Self {
            overrides: rule.overrides,
            messages: rule.messages,
            tools: rule.tools,
        }
    }
}

impl RewriteRule {
    /// Create a validated rewrite rule
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override names an empty field, targets
    /// `messages` or `tools` (use the injection lists instead), or sets `model` to
    /// anything but a non-empty string.
    pub fn new(
        overrides: Vec<FieldOverride>,
        messages: Vec<ChatMessage>,
        tools: Vec<Value>,
    ) -> AppResult<Self> {
        for o in &overrides {
            if o.field.trim().is_empty() {
                return Err(AppError::Config(
                    "override field name cannot be empty".to_string(),
                ));
            }
            if RESERVED_FIELDS.contains(&o.field.as_str()) {
                return Err(AppError::Config(format!(
                    "'{}' cannot be overridden; use the '{}' injection list instead",
                    o.field, o.field
                )));
            }
            if o.field == "model" && !o.value.as_str().is_some_and(|m| !m.trim().is_empty()) {
                return Err(AppError::Config(
                    "'model' override must be a non-empty string".to_string(),
                ));
            }
        }
        Ok(Self {
            overrides,
            messages,
            tools,
        })
    }

    /// Rule with only field overrides
    pub fn with_overrides(overrides: Vec<FieldOverride>) -> AppResult<Self> {
        Self::new(overrides, Vec::new(), Vec::new())
    }

    pub fn overrides(&self) -> &[FieldOverride] {
        &self.overrides
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn tools(&self) -> &[Value] {
        &self.tools
    }

    /// The model this rule renames the request to, if any (last override wins)
    pub fn model_override(&self) -> Option<&str> {
        self.overrides
            .iter()
            .rev()
            .find(|o| o.field == "model")
            .and_then(|o| o.value.as_str())
    }

    /// True when the rule only overrides fields, making it idempotent
    pub fn is_override_only(&self) -> bool {
        self.messages.is_empty() && self.tools.is_empty()
    }

    /// Apply the rule to a request
    ///
    /// Must be called once per request: the injection steps add another copy of
    /// their entries on every call.
    pub fn apply(&self, mut request: ChatRequest) -> ChatRequest {
        for o in &self.overrides {
            request.set_field(&o.field, o.value.clone());
        }
        request.prepend_messages(&self.messages);
        request.append_tools(&self.tools);
        request
    }
}
