//! Hook and CRD documents
//!
//! Hooks and CRDs are rendered apart from the main manifest and appended to it
//! before splitting, each headed by its own `# Source:` comment.

use serde::{Deserialize, Serialize};

use crate::select::SplitOptions;
use crate::split::{split_documents, Document};

/// Hook events that only run under `test`
pub const TEST_EVENTS: &[&str] = &["test", "test-success"];

/// Annotations that mark a document as a hook
const HOOK_ANNOTATIONS: &[&str] = &["chartwright.io/hook", "helm.sh/hook"];

/// A rendered hook document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    /// Chart-qualified template path (`mychart/templates/job.yaml`)
    pub path: String,

    /// Rendered hook resource
    pub manifest: String,

    /// Events the hook runs on (`pre-install`, `test`, ...)
    #[serde(default)]
    pub events: Vec<String>,
}

impl Hook {
    pub fn new<I, S>(path: impl Into<String>, manifest: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            manifest: manifest.into(),
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the hook runs on a test event
    pub fn is_test(&self) -> bool {
        self.events
            .iter()
            .any(|event| TEST_EVENTS.contains(&event.as_str()))
    }

    /// Read a hook from an annotated document
    ///
    /// Returns `None` when the document is not valid YAML or carries no hook
    /// annotation.
    pub fn from_document(document: &Document) -> Option<Self> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(&document.content).ok()?;
        let annotations = yaml
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.as_mapping())?;

        let events = HOOK_ANNOTATIONS
            .iter()
            .find_map(|key| annotations.get(*key))
            .and_then(|v| v.as_str())
            .map(parse_hook_events)?;

        let (path, manifest) = strip_source_comment(&document.content);
        Some(Self {
            path: path.unwrap_or_default(),
            manifest,
            events,
        })
    }
}

/// Collect every hook from a rendered multi-document text
pub fn hooks_from_manifest(text: &str) -> Vec<Hook> {
    split_documents(text)
        .iter()
        .filter_map(Hook::from_document)
        .collect()
}

/// Parse comma-separated hook events
pub fn parse_hook_events(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|event| !event.is_empty())
        .map(String::from)
        .collect()
}

/// A custom resource definition shipped with the chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crd {
    /// Chart-qualified file name (`mychart/crds/widget.yaml`)
    pub filename: String,

    pub content: String,
}

impl Crd {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Append hooks and CRDs to the main manifest according to `options`
pub fn assemble(manifest: &str, hooks: &[Hook], crds: &[Crd], options: &SplitOptions) -> String {
    let mut text = manifest.to_string();

    if !options.disable_hooks {
        for hook in hooks {
            if options.skip_tests && hook.is_test() {
                continue;
            }
            if hook.path.is_empty() {
                text.push_str(&format!("---\n{}\n", hook.manifest));
            } else {
                text.push_str(&format!("---\n# Source: {}\n{}\n", hook.path, hook.manifest));
            }
        }
    }

    if options.include_crds {
        for crd in crds {
            text.push_str(&format!("---\n# Source: {}\n{}\n", crd.filename, crd.content));
        }
    }

    text
}

/// Split off a leading `# Source: ` line, returning its raw path
fn strip_source_comment(content: &str) -> (Option<String>, String) {
    let mut path = None;
    let mut body = Vec::new();
    for line in content.lines() {
        match line.strip_prefix("# Source: ") {
            Some(source) if path.is_none() => path = Some(source.trim().to_string()),
            _ => body.push(line),
        }
    }
    (path, body.join("\n"))
}
