//! Core error types

use thiserror::Error;

use crate::compose::SourceKind;
use crate::strvals::StrvalsError;

#[derive(Error, Debug)]
pub enum CoreError {
    /// An override could not be applied to the values tree
    #[error("failed parsing {kind} key {path:?} with value {value}, {cause}")]
    Parse {
        kind: SourceKind,
        path: String,
        /// Rendered value; fingerprinted for sensitive overrides
        value: String,
        #[source]
        cause: StrvalsError,
    },

    #[error("invalid values document #{index}: {message}")]
    InvalidDocument { index: usize, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Source kind of a failed override, if this error came from one
    pub fn source_kind(&self) -> Option<SourceKind> {
        match self {
            CoreError::Parse { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
