//! Structured resource conversion
//!
//! Rendered documents become one JSON object keyed by
//! `<kind>/<apiVersion>/<name>` (`<namespace>/<kind>/<apiVersion>/<name>`
//! for namespaced objects), with every `Secret` payload replaced by its
//! fingerprint so the output can be diffed safely.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chartwright_core::fingerprint_value;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{ConversionError, Result};
use crate::split::Document;

/// Key identifying a resource in the structured output
///
/// The kind is lowercased and the namespace, when present, is the first
/// segment. Missing fields are left empty.
pub fn resource_key(resource: &Map<String, JsonValue>) -> String {
    let kind = field(resource.get("kind")).to_lowercase();
    let api_version = field(resource.get("apiVersion"));
    let metadata = resource.get("metadata");
    let name = field(metadata.and_then(|m| m.get("name")));
    let namespace = field(metadata.and_then(|m| m.get("namespace")));

    if namespace.is_empty() {
        format!("{kind}/{api_version}/{name}")
    } else {
        format!("{namespace}/{kind}/{api_version}/{name}")
    }
}

/// Convert documents into resources keyed by [`resource_key`]
///
/// Empty and comment-only documents are skipped. A later document with the
/// same key replaces an earlier one.
pub fn to_resources(documents: &[Document]) -> Result<BTreeMap<String, JsonValue>> {
    let mut resources = BTreeMap::new();

    for doc in documents {
        if is_comment_only(&doc.content) {
            debug!(index = doc.index, "skipping comment-only document");
            continue;
        }

        let value: JsonValue =
            serde_yaml::from_str(&doc.content).map_err(|source| ConversionError::Yaml {
                index: doc.index,
                source,
            })?;

        let mut resource = match value {
            JsonValue::Null => {
                debug!(index = doc.index, "skipping empty document");
                continue;
            }
            JsonValue::Object(map) => map,
            _ => return Err(ConversionError::NotAMapping { index: doc.index }.into()),
        };

        if is_secret(&resource) {
            digest_secret(&mut resource);
        }

        let key = resource_key(&resource);
        if resources.insert(key.clone(), JsonValue::Object(resource)).is_some() {
            warn!(%key, "duplicate resource, keeping the later document");
        }
    }

    Ok(resources)
}

/// Convert documents into a JSON object string
pub fn to_resources_json(documents: &[Document]) -> Result<String> {
    let resources = to_resources(documents)?;
    let json = serde_json::to_string_pretty(&resources).map_err(ConversionError::from)?;
    Ok(json)
}

fn is_comment_only(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}

fn field(value: Option<&JsonValue>) -> String {
    value
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn is_secret(resource: &Map<String, JsonValue>) -> bool {
    resource.get("kind").and_then(JsonValue::as_str) == Some("Secret")
}

/// Replace `data` and `stringData` entries with fingerprints
///
/// `data` entries are base64-decoded first, so one plaintext yields the same
/// token whichever field carried it.
fn digest_secret(resource: &mut Map<String, JsonValue>) {
    if let Some(JsonValue::Object(data)) = resource.get_mut("data") {
        for value in data.values_mut() {
            if let Some(encoded) = value.as_str() {
                let token = match decode(encoded) {
                    Some(plain) => fingerprint_value(&plain),
                    None => fingerprint_value(encoded),
                };
                *value = JsonValue::String(token);
            }
        }
    }

    if let Some(JsonValue::Object(data)) = resource.get_mut("stringData") {
        for value in data.values_mut() {
            if let Some(plain) = value.as_str() {
                *value = JsonValue::String(fingerprint_value(plain));
            }
        }
    }
}

fn decode(encoded: &str) -> Option<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).ok()?;
    String::from_utf8(bytes).ok()
}
