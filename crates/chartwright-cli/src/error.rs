//! CLI error types with exit code handling
//!
//! Library errors are folded into one `CliError` so every failure maps to an
//! exit code.

use chartwright_core::CoreError;
use chartwright_manifest::ManifestError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Values could not be composed
    #[error("Values error: {message}")]
    #[diagnostic(code(chartwright::cli::values))]
    Values {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A show-only pattern matched nothing
    #[error("Template error: {message}")]
    #[diagnostic(code(chartwright::cli::template))]
    Template {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Rendered manifests could not be converted
    #[error("Conversion error: {message}")]
    #[diagnostic(code(chartwright::cli::conversion))]
    Conversion { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartwright::cli::io))]
    Io { message: String },

    /// Invalid command line input
    #[error("{message}")]
    #[diagnostic(code(chartwright::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(chartwright::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Values { .. } => exit_codes::VALUES_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Conversion { .. } => exit_codes::CONVERSION_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a usage error with help text
    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::Parse { .. } => CliError::Values {
                message: err.to_string(),
                help: Some("Escape literal '.', ',', '=' and '[' in keys with a backslash".into()),
            },
            other => CliError::Values {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<ManifestError> for CliError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::TemplateNotFound { .. } => CliError::Template {
                message: err.to_string(),
                help: Some(
                    "Patterns match template paths relative to the chart, e.g. templates/deployment.yaml"
                        .into(),
                ),
            },
            ManifestError::InvalidPattern { .. } => CliError::Usage {
                message: err.to_string(),
                help: None,
            },
            other => CliError::Conversion {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
