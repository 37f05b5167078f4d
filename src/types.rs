//! OpenAI-compatible request and catalog types
//!
//! Requests are typed only as far as the pipeline needs: `model` and `messages`
//! are explicit, every other field is carried through untouched. Validation runs
//! once, in [`ChatRequest::from_slice`], before the request enters the pipeline.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Object type for list responses (e.g., model list)
pub const OBJECT_LIST: &str = "list";
/// Object type for individual model entries
pub const OBJECT_MODEL: &str = "model";

// =============================================================================
// Message Types
// =============================================================================

/// A single chat message
///
/// Only `role` is interpreted. `content`, `name`, `tool_calls` and anything else the
/// client sent stay in `fields` so the backend receives them byte-for-byte in value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    role: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl ChatMessage {
    /// Create a message with plain string content
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("content".to_string(), Value::String(content.into()));
        Self {
            role: role.into(),
            fields,
        }
    }

    /// Get the role
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Get the raw content value, if any
    pub fn content(&self) -> Option<&Value> {
        self.fields.get("content")
    }

    /// Text used for token estimation
    ///
    /// String content is returned as-is. Multimodal content (a list of parts)
    /// contributes the concatenation of its `text` parts. Anything else is empty.
    pub fn text(&self) -> String {
        match self.content() {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect(),
            _ => String::new(),
        }
    }
}

// =============================================================================
// Chat Request
// =============================================================================

/// Chat completion request flowing through the routing and rewrite pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ChatRequest {
    /// Create a request from a model name and messages
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            extra: Map::new(),
        }
    }

    /// Parse and validate an inbound request body
    ///
    /// # Errors
    /// Returns `AppError::Validation` if:
    /// - the body is not a JSON object
    /// - `messages` is missing or not a list, or an entry is not an object with a
    ///   string `role`
    /// - `model` is missing or not a string
    /// - `tools` is present but not a list
    pub fn from_slice(body: &[u8]) -> AppResult<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("body is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON body
    pub fn from_value(value: Value) -> AppResult<Self> {
        let Value::Object(mut body) = value else {
            return Err(AppError::Validation(
                "request body must be a JSON object".to_string(),
            ));
        };

        let messages = match body.shift_remove("messages") {
            Some(Value::Array(messages)) => messages,
            _ => {
                return Err(AppError::Validation(
                    "'messages' field is missing or not a list".to_string(),
                ));
            }
        };

        let model = match body.shift_remove("model") {
            Some(Value::String(model)) => model,
            None | Some(Value::Null) => {
                return Err(AppError::Validation("'model' field is missing".to_string()));
            }
            Some(_) => {
                return Err(AppError::Validation(
                    "'model' field must be a string".to_string(),
                ));
            }
        };

        if let Some(tools) = body.get("tools")
            && !tools.is_array()
        {
            return Err(AppError::Validation(
                "'tools' field must be a list".to_string(),
            ));
        }

        let messages = messages
            .into_iter()
            .enumerate()
            .map(|(index, message)| {
                if !message.get("role").is_some_and(Value::is_string) {
                    return Err(AppError::Validation(format!(
                        "message {} must be an object with a string 'role'",
                        index
                    )));
                }
                serde_json::from_value::<ChatMessage>(message).map_err(|e| {
                    AppError::Validation(format!("message {} is malformed: {}", index, e))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            model,
            messages,
            extra: body,
        })
    }

    /// Get the requested model (alias or concrete backend model)
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Replace the model name
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Get the messages in order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Get a passthrough top-level field
    pub fn field(&self, name: &str) -> Option<&Value> {
        match name {
            "model" | "messages" => None,
            _ => self.extra.get(name),
        }
    }

    /// Add or replace a top-level field
    ///
    /// `model` is routed to [`set_model`](Self::set_model) when the value is a
    /// string. `messages` is never replaced here; callers extend it through
    /// [`prepend_messages`](Self::prepend_messages).
    pub fn set_field(&mut self, name: &str, value: Value) {
        match (name, value) {
            ("model", Value::String(model)) => self.model = model,
            ("model", _) | ("messages", _) => {
                tracing::warn!(field = name, "Ignoring override of reserved field");
            }
            (_, value) => {
                self.extra.insert(name.to_string(), value);
            }
        }
    }

    /// Whether the client asked for an event-stream response
    pub fn is_stream(&self) -> bool {
        self.extra
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Insert messages ahead of all existing ones, preserving their order
    pub fn prepend_messages(&mut self, injected: &[ChatMessage]) {
        if injected.is_empty() {
            return;
        }
        self.messages.splice(0..0, injected.iter().cloned());
    }

    /// Get the top-level tools list, if present
    pub fn tools(&self) -> Option<&Vec<Value>> {
        self.extra.get("tools").and_then(Value::as_array)
    }

    /// Append tools to the top-level `tools` list, creating it if absent
    ///
    /// Existing entries are kept in place. A non-list `tools` value is rejected
    /// during validation, so it is replaced only if a caller built the request
    /// by hand.
    pub fn append_tools(&mut self, injected: &[Value]) {
        if injected.is_empty() {
            return;
        }
        let tools = self
            .extra
            .entry("tools".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !tools.is_array() {
            *tools = Value::Array(Vec::new());
        }
        if let Value::Array(list) = tools {
            list.extend(injected.iter().cloned());
        }
    }

    /// Concatenated message text in message order, used for token estimation
    pub fn prompt_text(&self) -> String {
        self.messages.iter().map(ChatMessage::text).collect()
    }
}

// =============================================================================
// Model Catalog
// =============================================================================

/// A single model entry in a `/v1/models` listing
///
/// Upstream entries keep any extra fields they carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    pub id: String,
    #[serde(default = "default_object_model")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_object_model() -> String {
    OBJECT_MODEL.to_string()
}

impl ModelCatalogEntry {
    /// Create a synthesized entry for a virtual alias
    pub fn virtual_alias(id: impl Into<String>, created: i64, owned_by: &str) -> Self {
        Self {
            id: id.into(),
            object: OBJECT_MODEL.to_string(),
            created: Some(created),
            owned_by: Some(owned_by.to_string()),
            extra: Map::new(),
        }
    }
}

/// Model list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsListResponse {
    pub object: String,
    pub data: Vec<ModelCatalogEntry>,
}

impl ModelsListResponse {
    /// Create a new models list response
    pub fn new(data: Vec<ModelCatalogEntry>) -> Self {
        Self {
            object: OBJECT_LIST.to_string(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> AppResult<ChatRequest> {
        ChatRequest::from_value(value)
    }

    #[test]
    fn test_passthrough_fields_keep_client_order() {
        let body = br#"{"model":"m","top_p":1,"messages":[{"role":"user","name":"alice","content":"hi"}],"stream":true,"n":2}"#;
        let request = ChatRequest::from_slice(body).unwrap();

        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"model":"m","messages":[{"role":"user","name":"alice","content":"hi"}],"top_p":1,"stream":true,"n":2}"#
        );
    }

    #[test]
    fn test_parse_valid_request_keeps_passthrough_fields() {
        let request = parse(json!({
            "model": "gpt-4o-auto",
            "messages": [{"role": "user", "content": "hi", "name": "alice"}],
            "temperature": 0.2,
            "stream": true
        }))
        .unwrap();

        assert_eq!(request.model(), "gpt-4o-auto");
        assert_eq!(request.messages().len(), 1);
        assert_eq!(request.field("temperature"), Some(&json!(0.2)));
        assert!(request.is_stream());

        let round = serde_json::to_value(&request).unwrap();
        assert_eq!(round["messages"][0]["name"], "alice");
        assert_eq!(round["temperature"], 0.2);
    }

    #[test]
    fn test_missing_messages_is_rejected() {
        let err = parse(json!({"model": "m"})).unwrap_err();
        assert!(err.to_string().contains("'messages'"));
    }

    #[test]
    fn test_messages_not_list_is_rejected() {
        let err = parse(json!({"model": "m", "messages": "hello"})).unwrap_err();
        assert!(err.to_string().contains("not a list"));
    }

    #[test]
    fn test_missing_model_is_rejected() {
        let err = parse(json!({"messages": []})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: 'model' field is missing");
    }

    #[test]
    fn test_non_string_model_is_rejected() {
        let err = parse(json!({"model": 4, "messages": []})).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_message_without_role_is_rejected() {
        let err = parse(json!({"model": "m", "messages": [{"content": "x"}]})).unwrap_err();
        assert!(err.to_string().contains("message 0"));
    }

    #[test]
    fn test_non_list_tools_is_rejected() {
        let err = parse(json!({"model": "m", "messages": [], "tools": {}})).unwrap_err();
        assert!(err.to_string().contains("'tools'"));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = ChatRequest::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_null_content_survives_round_trip() {
        let request = parse(json!({
            "model": "m",
            "messages": [{"role": "assistant", "content": null, "tool_calls": []}]
        }))
        .unwrap();
        let round = serde_json::to_value(&request).unwrap();
        assert!(round["messages"][0]["content"].is_null());
        assert!(round["messages"][0].get("content").is_some());
    }

    #[test]
    fn test_prompt_text_concatenates_in_order_ignoring_role() {
        let request = parse(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "abc"},
                {"role": "user", "content": [
                    {"type": "text", "text": "def"},
                    {"type": "image_url", "image_url": {"url": "x"}},
                    {"type": "text", "text": "ghi"}
                ]},
                {"role": "assistant", "content": null}
            ]
        }))
        .unwrap();
        assert_eq!(request.prompt_text(), "abcdefghi");
    }

    #[test]
    fn test_append_tools_creates_list() {
        let mut request = ChatRequest::new("m", vec![]);
        assert!(request.tools().is_none());
        request.append_tools(&[json!({"googleSearch": {}})]);
        assert_eq!(request.tools().unwrap().len(), 1);
    }

    #[test]
    fn test_set_field_model_renames() {
        let mut request = ChatRequest::new("alias", vec![]);
        request.set_field("model", json!("backend-model"));
        assert_eq!(request.model(), "backend-model");
        assert!(request.field("model").is_none());
    }

    #[test]
    fn test_catalog_entry_preserves_extra_fields() {
        let entry: ModelCatalogEntry = serde_json::from_value(json!({
            "id": "gpt-4o",
            "object": "model",
            "created": 1700000000,
            "owned_by": "openai",
            "permission": []
        }))
        .unwrap();
        assert_eq!(entry.created, Some(1700000000));
        let round = serde_json::to_value(&entry).unwrap();
        assert!(round.get("permission").is_some());
    }

    #[test]
    fn test_models_list_response() {
        let response = ModelsListResponse::new(vec![ModelCatalogEntry::virtual_alias(
            "alias", 1, "user",
        )]);
        assert_eq!(response.object, "list");
        assert_eq!(response.data[0].object, "model");
    }
}
