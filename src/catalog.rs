//! Model catalog aggregation
//!
//! Merges the backend's `/v1/models` listing with the configured virtual aliases
//! so clients can discover routed and rewritten model names.

use crate::error::{AppError, AppResult};
use crate::types::ModelCatalogEntry;
use serde_json::Value;
use std::collections::HashSet;

/// Creation timestamp used when the backend lists no models
pub const DEFAULT_CREATED: i64 = 1677649963;

/// `owned_by` value for synthesized alias entries
pub const VIRTUAL_OWNER: &str = "user";

/// Extract the entry list from a raw backend catalog payload
///
/// # Errors
///
/// Returns `AppError::UpstreamProtocol` if `data` is missing or not a list, or an
/// entry is not an object with a string `id`. `url` is only used for the message.
pub fn parse_upstream(url: &str, payload: Value) -> AppResult<Vec<ModelCatalogEntry>> {
    let protocol_error = |reason: String| AppError::UpstreamProtocol {
        url: url.to_string(),
        reason,
    };

    let Value::Object(mut body) = payload else {
        return Err(protocol_error(
            "catalog payload is not a JSON object".to_string(),
        ));
    };
    let Some(Value::Array(entries)) = body.remove("data") else {
        return Err(protocol_error(
            "'data' field is missing or not a list".to_string(),
        ));
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<ModelCatalogEntry>(entry)
                .map_err(|e| protocol_error(format!("model entry {} is malformed: {}", index, e)))
        })
        .collect()
}

/// Merge upstream entries with virtual aliases
///
/// Upstream entries are kept as-is and in order. Each alias not already present by
/// `id` is appended once, borrowing `created` from the first upstream entry (or
/// [`DEFAULT_CREATED`]) and owned by [`VIRTUAL_OWNER`].
pub fn merge<'a, I>(upstream: Vec<ModelCatalogEntry>, aliases: I) -> Vec<ModelCatalogEntry>
where
    I: IntoIterator<Item = &'a str>,
{
    let created = upstream
        .first()
        .and_then(|entry| entry.created)
        .unwrap_or(DEFAULT_CREATED);

    let mut seen: HashSet<String> = upstream.iter().map(|entry| entry.id.clone()).collect();
    let mut merged = upstream;

    for alias in aliases {
        if seen.insert(alias.to_string()) {
            merged.push(ModelCatalogEntry::virtual_alias(
                alias,
                created,
                VIRTUAL_OWNER,
            ));
        }
    }

    merged
}
