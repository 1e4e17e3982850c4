//! Error types for chartwright-manifest

use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Errors that can occur while splitting or converting manifests
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// A show-only pattern matched no template
    #[error("could not find template {pattern} in chart")]
    TemplateNotFound { pattern: String },

    /// A show-only pattern is not a valid glob
    #[error("invalid show-only pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Rendered documents could not be converted to resources
    #[error("failed to convert manifests: {0}")]
    Conversion(#[from] ConversionError),
}

/// Cause of a failed structured conversion
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("document #{index} is not valid YAML: {source}")]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("document #{index} is not a mapping")]
    NotAMapping { index: usize },

    #[error("resources could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
}
