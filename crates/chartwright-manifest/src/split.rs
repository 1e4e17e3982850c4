//! Document splitting
//!
//! A boundary is a line starting with `---` followed by end of line or
//! whitespace. Anything after the marker on that line belongs to the next
//! document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// `# Source: <chart>/<path>` comment written by the renderer
static SOURCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^# Source: [^/\n]+/(.+)$").expect("source comment pattern is valid")
});

/// One manifest fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Position in encounter order, unique within one split
    pub index: usize,

    /// Template path relative to the chart, when the fragment names one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Trimmed fragment text
    pub content: String,
}

impl Document {
    pub fn new(index: usize, content: impl Into<String>) -> Self {
        let content = content.into();
        let path = source_path(&content);
        Self {
            index,
            path,
            content,
        }
    }

    /// Path used for ordering; path-less documents sort first
    pub fn sort_key(&self) -> (&str, usize) {
        (self.path.as_deref().unwrap_or(""), self.index)
    }
}

/// Split rendered text into non-blank documents
pub fn split_documents(text: &str) -> Vec<Document> {
    split_raw(text)
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .enumerate()
        .map(|(index, raw)| Document::new(index, raw))
        .collect()
}

/// Template path named by a `# Source:` comment, chart segment removed
pub fn source_path(content: &str) -> Option<String> {
    let captures = SOURCE_RE.captures(content)?;
    let path = captures.get(1)?.as_str().trim();
    (!path.is_empty()).then(|| path.to_string())
}

fn split_raw(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        match boundary_remainder(line) {
            Some(rest) => {
                fragments.push(std::mem::take(&mut current));
                current.push_str(rest);
            }
            None => current.push_str(line),
        }
    }
    fragments.push(current);

    fragments
}

fn boundary_remainder(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("---")?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest.trim_start_matches([' ', '\t'])),
        Some(_) => None,
    }
}
