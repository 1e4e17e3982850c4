//! Show-only selection and regrouping by template path

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ManifestError, Result};
use crate::hooks::{assemble, Crd, Hook};
use crate::split::{split_documents, Document};

/// `*` and `?` never cross a `/`
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// How a render is split and filtered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitOptions {
    /// Leave every hook out
    pub disable_hooks: bool,

    /// Leave out hooks running on `test` events
    pub skip_tests: bool,

    /// Append CRD documents after the hooks
    pub include_crds: bool,

    /// Glob patterns over template paths; empty keeps everything
    pub show_only: Vec<String>,
}

/// Raw output of one chart render
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub manifest: String,
    pub hooks: Vec<Hook>,
    pub crds: Vec<Crd>,
    pub notes: String,
}

impl RenderOutput {
    pub fn new(manifest: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
            ..Default::default()
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Hook>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_crds(mut self, crds: Vec<Crd>) -> Self {
        self.crds = crds;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Split, filter and regroup this render
    pub fn split(&self, options: &SplitOptions) -> Result<Rendered> {
        split_manifests(self, options)
    }
}

/// A render split into documents and regrouped by template path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Template path -> every document rendered from it
    pub manifests: BTreeMap<String, String>,

    /// Every retained document, path-less ones included
    pub bundle: String,

    /// Notes text, passed through
    pub notes: String,

    documents: Vec<Document>,
}

impl Rendered {
    /// Retained documents in output order
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Split a render into a manifest map and a bundle
pub fn split_manifests(output: &RenderOutput, options: &SplitOptions) -> Result<Rendered> {
    let text = assemble(&output.manifest, &output.hooks, &output.crds, options);
    let documents = split_documents(&text);
    let total = documents.len();

    let mut documents = select(documents, &options.show_only)?;
    documents.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut manifests: BTreeMap<String, String> = BTreeMap::new();
    let mut bundle = String::new();
    for doc in &documents {
        let entry = format!("---\n{}\n", doc.content);
        if let Some(path) = &doc.path {
            manifests.entry(path.clone()).or_default().push_str(&entry);
        }
        bundle.push_str(&entry);
    }

    debug!(
        total,
        retained = documents.len(),
        templates = manifests.len(),
        "split rendered manifests"
    );

    Ok(Rendered {
        manifests,
        bundle,
        notes: output.notes.clone(),
        documents,
    })
}

/// Keep documents whose path matches at least one pattern
///
/// Every pattern must match some document. Path-less documents are dropped
/// as soon as one pattern is given.
pub fn select(documents: Vec<Document>, patterns: &[String]) -> Result<Vec<Document>> {
    if patterns.is_empty() {
        return Ok(documents);
    }

    let mut keep = vec![false; documents.len()];
    for raw in patterns {
        let pattern = compile(raw)?;
        let mut found = false;
        for (doc, keep) in documents.iter().zip(keep.iter_mut()) {
            let Some(path) = &doc.path else { continue };
            if pattern.matches_with(&path.replace('\\', "/"), MATCH_OPTIONS) {
                *keep = true;
                found = true;
            }
        }
        if !found {
            return Err(ManifestError::TemplateNotFound {
                pattern: raw.clone(),
            });
        }
    }

    Ok(documents
        .into_iter()
        .zip(keep)
        .filter_map(|(doc, keep)| keep.then_some(doc))
        .collect())
}

fn compile(raw: &str) -> Result<Pattern> {
    Pattern::new(&raw.replace('\\', "/")).map_err(|e| ManifestError::InvalidPattern {
        pattern: raw.to_string(),
        message: e.to_string(),
    })
}
