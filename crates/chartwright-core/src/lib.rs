//! Chartwright Core - Value composition for chart releases
//!
//! This crate provides the value-side types used throughout Chartwright:
//! - `strvals`: The `a.b=c,list={x,y}` override language
//! - `Values`: Configuration values with deep merge support
//! - `ValueSources`: Layered composition of documents and overrides
//! - `RedactionSet`: Cloaking and fingerprinting of sensitive overrides

pub mod compose;
pub mod error;
pub mod redact;
pub mod strvals;
pub mod values;

pub use compose::{Composed, SetListValue, SetValue, SourceKind, ValueSources};
pub use error::{CoreError, Result};
pub use redact::{fingerprint_value, RedactionSet, SENSITIVE_PLACEHOLDER};
pub use strvals::{StrvalsError, TypeHint};
pub use values::Values;
