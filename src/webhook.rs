//! Webhook payload decoding

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DeployError, Result};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const PAYLOAD_FIELD: &str = "payload";

/// JSON document extracted from a webhook body.
#[derive(Debug, Clone)]
pub struct DecodedPayload {
    /// Canonical JSON bytes: the raw body, or the decoded `payload` form field
    pub canonical: Vec<u8>,
    pub document: Map<String, Value>,
}

impl DecodedPayload {
    /// Looks up a string field, `None` when absent or not a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.document.get(key).and_then(Value::as_str)
    }

    /// Looks up a nested object, `None` when absent or not an object.
    pub fn object_field(&self, key: &str) -> Option<&Map<String, Value>> {
        self.document.get(key).and_then(Value::as_object)
    }

    /// Fields of interest recorded in the audit log.
    pub fn summary(&self) -> Option<PayloadSummary> {
        let repository = self.object_field("repository")?;
        Some(PayloadSummary {
            repository_name: repository.get("name").cloned(),
            full_name: repository.get("full_name").cloned(),
            default_branch: repository.get("default_branch").cloned(),
            pushed_at: repository.get("pushed_at").cloned(),
            git_ref: self.str_field("ref").map(String::from),
            after: self.str_field("after").map(String::from),
        })
    }
}

/// Subset of a push payload kept in the audit record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PayloadSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<Value>,
    // GitHub sends a unix timestamp for pushes and a string elsewhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_at: Option<Value>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Extracts the JSON document from a webhook body.
///
/// Form-encoded bodies carry the JSON in a percent-encoded `payload` field,
/// anything else is taken as JSON directly.
pub fn decode_payload(body: &[u8], content_type: &str) -> Result<DecodedPayload> {
    let canonical = if content_type.contains(FORM_CONTENT_TYPE) {
        extract_form_payload(body)?
    } else {
        body.to_vec()
    };

    let document: Map<String, Value> = serde_json::from_slice(&canonical)
        .map_err(|e| DeployError::Decode(format!("invalid JSON: {}", e)))?;

    Ok(DecodedPayload {
        canonical,
        document,
    })
}

fn extract_form_payload(body: &[u8]) -> Result<Vec<u8>> {
    let form = std::str::from_utf8(body)
        .map_err(|e| DeployError::Decode(format!("form body is not UTF-8: {}", e)))?;

    for pair in form.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if form_decode(key)? != PAYLOAD_FIELD {
            continue;
        }
        return form_decode(value).map(String::into_bytes);
    }

    Err(DeployError::Decode(format!(
        "form body has no '{}' field",
        PAYLOAD_FIELD
    )))
}

fn form_decode(component: &str) -> Result<String> {
    let plus_as_space = component.replace('+', " ");
    urlencoding::decode(&plus_as_space)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| DeployError::Decode(format!("invalid percent-encoding: {}", e)))
}
