//! Chartwright Manifest - Rendered manifest handling
//!
//! Turns the text produced by a chart render into something callers can
//! diff, print or write to disk:
//! - `split`: Document boundaries and template path derivation
//! - `hooks`: Hook and CRD documents appended to the main manifest
//! - `select`: Show-only filtering and regrouping by template path
//! - `resources`: Structured JSON form with Secret payloads digested

pub mod error;
pub mod hooks;
pub mod resources;
pub mod select;
pub mod split;

pub use error::{ConversionError, ManifestError, Result};
pub use hooks::{Crd, Hook};
pub use resources::{resource_key, to_resources, to_resources_json};
pub use select::{split_manifests, Rendered, RenderOutput, SplitOptions};
pub use split::{split_documents, Document};
