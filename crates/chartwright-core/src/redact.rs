//! Sensitive value redaction
//!
//! Two separate passes share one [`RedactionSet`]:
//!
//! - **cloaking** overwrites sensitive leaves of a values tree with
//!   [`SENSITIVE_PLACEHOLDER`] before the tree is logged
//! - **fingerprinting** replaces every occurrence of a sensitive plaintext in
//!   rendered text with a short digest token, so diffs still show *that*
//!   something changed without showing *what*
//!
//! Fingerprints are the first 8 bytes of the SHA-256 of the plaintext, hex
//! encoded: `(sensitive value 1f0a9c32d4e5b678)`.

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::values::Values;

/// Placeholder written over cloaked leaves
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";

/// Number of digest bytes kept in a fingerprint
pub const FINGERPRINT_BYTES: usize = 8;

/// Hex digest of a sensitive plaintext, [`FINGERPRINT_BYTES`] wide
pub fn digest_hex(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

/// Token that stands in for a sensitive plaintext
pub fn fingerprint_value(plaintext: &str) -> String {
    format!("(sensitive value {})", digest_hex(plaintext))
}

/// Paths and plaintexts of the sensitive overrides of one render
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionSet {
    paths: Vec<String>,
    secrets: Vec<String>,
}

impl RedactionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dotted values path to cloak
    pub fn record_path(&mut self, path: &str) {
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_string());
        }
    }

    /// Record a plaintext to fingerprint; empty strings are ignored
    pub fn record_secret(&mut self, plaintext: &str) {
        if !plaintext.is_empty() && !self.secrets.iter().any(|s| s == plaintext) {
            self.secrets.push(plaintext.to_string());
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn secrets(&self) -> impl Iterator<Item = &str> {
        self.secrets.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.secrets.is_empty()
    }

    /// Copy of `values` with every recorded path cloaked
    pub fn cloak(&self, values: &Values) -> Values {
        let mut cloaked = values.clone();
        self.cloak_in_place(&mut cloaked);
        cloaked
    }

    /// Cloak every recorded path in `values`
    ///
    /// Paths whose parents are missing or are not maps, or whose leaf does
    /// not exist, are skipped.
    pub fn cloak_in_place(&self, values: &mut Values) {
        for path in &self.paths {
            let segments = split_path(path);
            if !cloak_path(&mut values.0, &segments) {
                debug!(path = %path, "sensitive path not present, not cloaked");
            }
        }
    }

    /// Replace every recorded plaintext in `text` with its fingerprint
    ///
    /// Text is scanned once, left to right; at each position the longest
    /// matching plaintext wins, and fingerprints are never rescanned.
    pub fn fingerprint(&self, text: &str) -> String {
        if self.secrets.is_empty() {
            return text.to_string();
        }

        let mut secrets: Vec<&str> = self.secrets().collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let tokens: Vec<(&str, String)> = secrets
            .into_iter()
            .map(|s| (s, fingerprint_value(s)))
            .collect();

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        'scan: while !rest.is_empty() {
            for (secret, token) in &tokens {
                if let Some(after) = rest.strip_prefix(secret) {
                    out.push_str(token);
                    rest = after;
                    continue 'scan;
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
        out
    }
}

/// Split a dotted path on unescaped dots, removing the escapes
fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.push(chars.next().unwrap_or('\\')),
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn cloak_path(root: &mut JsonValue, segments: &[String]) -> bool {
    let Some((leaf, parents)) = segments.split_last() else {
        return false;
    };

    let mut node = root;
    for key in parents {
        node = match node.get_mut(key.as_str()) {
            Some(child) if child.is_object() => child,
            _ => return false,
        };
    }

    match node.get_mut(leaf.as_str()) {
        Some(value) => {
            *value = JsonValue::String(SENSITIVE_PLACEHOLDER.to_string());
            true
        }
        None => false,
    }
}
