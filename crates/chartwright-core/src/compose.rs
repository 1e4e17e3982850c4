//! Layered value composition
//!
//! Sources are applied in a fixed order, later layers winning:
//!
//! 1. `values` documents, deep-merged in order
//! 2. `set` overrides
//! 3. `setSensitive` overrides (also recorded for redaction)
//! 4. `setList` overrides
//!
//! The first failing override aborts the whole composition.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::redact::{fingerprint_value, RedactionSet};
use crate::strvals::{self, TypeHint};
use crate::values::Values;

/// Which layer an override came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Values,
    Set,
    SetSensitive,
    SetList,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Values => "values",
            SourceKind::Set => "set",
            SourceKind::SetSensitive => "set_sensitive",
            SourceKind::SetList => "set_list",
        };
        f.write_str(s)
    }
}

/// A single `name=value` override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetValue {
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    #[serde(default, rename = "type")]
    pub value_type: TypeHint,
}

impl SetValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            value_type: TypeHint::Auto,
        }
    }

    /// Set the type hint
    pub fn typed(mut self, value_type: TypeHint) -> Self {
        self.value_type = value_type;
        self
    }

    /// Parse a `name=value` command line argument
    ///
    /// The split happens at the first unescaped `=`; escapes are left in
    /// place for the parser.
    pub fn parse_arg(arg: &str, value_type: TypeHint) -> Option<Self> {
        let split = find_unescaped(arg, '=')?;
        Some(Self::new(&arg[..split], &arg[split + 1..]).typed(value_type))
    }

    /// The assignment expression handed to the parser
    pub fn expression(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// A `name={a,b,c}` override built from discrete items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetListValue {
    pub name: String,
    #[serde(default, deserialize_with = "scalar_strings")]
    pub value: Vec<String>,
}

impl SetListValue {
    pub fn new<I, S>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            value: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Items joined with commas, blanks dropped
    pub fn joined(&self) -> String {
        self.value
            .iter()
            .filter(|item| !item.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The assignment expression handed to the parser
    pub fn expression(&self) -> String {
        format!("{}={{{}}}", self.name, self.joined())
    }
}

/// Every value source for one render
///
/// Deserializes from a release configuration file:
///
/// ```yaml
/// values:
///   - image:
///       repository: nginx
/// set:
///   - name: image.tag
///     value: "1.25"
///     type: string
/// setSensitive:
///   - name: auth.password
///     value: hunter2
/// setList:
///   - name: ingress.hosts
///     value: [a.example.com, b.example.com]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSources {
    #[serde(default)]
    pub values: Vec<Values>,

    #[serde(default)]
    pub set: Vec<SetValue>,

    #[serde(default)]
    pub set_sensitive: Vec<SetValue>,

    #[serde(default)]
    pub set_list: Vec<SetListValue>,
}

/// Result of composing all value sources
#[derive(Debug, Clone, Default)]
pub struct Composed {
    /// Values handed to the renderer
    pub values: Values,

    /// Paths and plaintexts of every sensitive override
    pub redactions: RedactionSet,
}

impl Composed {
    /// Copy of the values safe for logging
    pub fn cloaked(&self) -> Values {
        self.redactions.cloak(&self.values)
    }
}

impl ValueSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load sources from a YAML configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let sources: Self = serde_yaml::from_str(&content)?;
        Ok(sources)
    }

    /// Append a pre-parsed values document
    pub fn with_values(mut self, values: Values) -> Self {
        self.values.push(values);
        self
    }

    /// Parse and append a YAML values document; blank text is skipped
    pub fn yaml_document(mut self, yaml: &str) -> Result<Self> {
        if !yaml.trim().is_empty() {
            self.values.push(Values::from_yaml(yaml)?);
        }
        Ok(self)
    }

    pub fn with_set(mut self, set: SetValue) -> Self {
        self.set.push(set);
        self
    }

    pub fn with_sensitive(mut self, set: SetValue) -> Self {
        self.set_sensitive.push(set);
        self
    }

    pub fn with_list(mut self, list: SetListValue) -> Self {
        self.set_list.push(list);
        self
    }

    /// Layer `other` on top of these sources
    pub fn extend(&mut self, other: ValueSources) {
        self.values.extend(other.values);
        self.set.extend(other.set);
        self.set_sensitive.extend(other.set_sensitive);
        self.set_list.extend(other.set_list);
    }

    /// Compose every source into one values tree
    pub fn compose(&self) -> Result<Composed> {
        let mut values = Values::new();

        for (index, document) in self.values.iter().enumerate() {
            match document.inner() {
                JsonValue::Object(_) => values.merge(document),
                JsonValue::Null => {}
                other => {
                    return Err(CoreError::InvalidDocument {
                        index,
                        message: format!("expected a mapping, found {}", json_kind(other)),
                    });
                }
            }
            debug!(index, "merged values document");
        }

        for set in &self.set {
            apply_set(&mut values, set, SourceKind::Set)?;
        }

        let mut redactions = RedactionSet::new();
        for set in &self.set_sensitive {
            apply_set(&mut values, set, SourceKind::SetSensitive)?;
            let assigned = strvals::parse(&set.expression(), set.value_type)
                .map_err(|cause| sensitive_error(set, cause))?;
            record_leaves(&mut redactions, None, &JsonValue::Object(assigned));
        }

        for list in &self.set_list {
            values
                .apply(&list.expression(), TypeHint::Auto)
                .map_err(|cause| CoreError::Parse {
                    kind: SourceKind::SetList,
                    path: list.name.clone(),
                    value: list.joined(),
                    cause,
                })?;
            debug!(kind = %SourceKind::SetList, path = %list.name, "applied override");
        }

        Ok(Composed { values, redactions })
    }
}

fn apply_set(values: &mut Values, set: &SetValue, kind: SourceKind) -> Result<()> {
    values
        .apply(&set.expression(), set.value_type)
        .map_err(|cause| match kind {
            SourceKind::SetSensitive => sensitive_error(set, cause),
            _ => CoreError::Parse {
                kind,
                path: set.name.clone(),
                value: set.value.clone(),
                cause,
            },
        })?;
    debug!(%kind, path = %set.name, value_type = %set.value_type, "applied override");
    Ok(())
}

fn sensitive_error(set: &SetValue, cause: strvals::StrvalsError) -> CoreError {
    CoreError::Parse {
        kind: SourceKind::SetSensitive,
        path: set.name.clone(),
        value: fingerprint_value(&set.value),
        cause,
    }
}

/// Record every leaf a sensitive assignment wrote
///
/// Map keys build the cloak path; a list is a leaf for cloaking, and each of
/// its scalars is a secret.
fn record_leaves(redactions: &mut RedactionSet, path: Option<&str>, value: &JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let key = strvals::escape_key(key);
                let child_path = match path {
                    Some(parent) => format!("{parent}.{key}"),
                    None => key,
                };
                record_leaves(redactions, Some(&child_path), child);
            }
        }
        leaf => {
            if let Some(path) = path {
                redactions.record_path(path);
            }
            record_secrets(redactions, leaf);
        }
    }
}

fn record_secrets(redactions: &mut RedactionSet, value: &JsonValue) {
    match value {
        JsonValue::String(s) => redactions.record_secret(s),
        JsonValue::Number(n) => redactions.record_secret(&n.to_string()),
        JsonValue::Bool(b) => redactions.record_secret(&b.to_string()),
        JsonValue::Array(items) => items.iter().for_each(|item| record_secrets(redactions, item)),
        JsonValue::Object(map) => map.values().for_each(|child| record_secrets(redactions, child)),
        JsonValue::Null => {}
    }
}

/// Accept any YAML scalar where a string is expected (`value: 3`)
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_text(JsonValue::deserialize(deserializer)?).map_err(D::Error::custom)
}

fn scalar_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<JsonValue>::deserialize(deserializer)?
        .into_iter()
        .map(scalar_text)
        .collect::<std::result::Result<_, _>>()
        .map_err(D::Error::custom)
}

fn scalar_text(value: JsonValue) -> std::result::Result<String, String> {
    match value {
        JsonValue::String(s) => Ok(s),
        JsonValue::Null => Ok(String::new()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(format!("expected a scalar, found {}", json_kind(&other))),
    }
}

fn find_unescaped(s: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == target {
            return Some(i);
        }
    }
    None
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::SENSITIVE_PLACEHOLDER;
    use crate::strvals::StrvalsError;
    use serde_json::json;

    #[test]
    fn test_override_preserves_siblings() {
        let composed = ValueSources::new()
            .with_values(Values(json!({"a": {"b": 1}})))
            .with_set(SetValue::new("a.c", "2"))
            .compose()
            .unwrap();

        assert_eq!(composed.values.0, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn test_scalar_override_replaces_map() {
        let composed = ValueSources::new()
            .with_values(Values(json!({"a": {"b": {"c": 1}}})))
            .with_set(SetValue::new("a.b", "2"))
            .compose()
            .unwrap();

        assert_eq!(composed.values.0, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_documents_merge_in_order() {
        let composed = ValueSources::new()
            .yaml_document("image:\n  repository: nginx\n  tag: \"1.0\"\nhosts: [a, b]\n")
            .unwrap()
            .yaml_document("")
            .unwrap()
            .yaml_document("image:\n  tag: \"2.0\"\nhosts: [c]\n")
            .unwrap()
            .compose()
            .unwrap();

        assert_eq!(
            composed.values.0,
            json!({"image": {"repository": "nginx", "tag": "2.0"}, "hosts": ["c"]})
        );
    }

    #[test]
    fn test_non_mapping_document_rejected() {
        let err = ValueSources::new()
            .with_values(Values::new())
            .with_values(Values(json!(["a", "b"])))
            .compose()
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidDocument { index: 1, .. }));
        assert!(err.to_string().contains("found a list"));
    }

    #[test]
    fn test_precedence() {
        let composed = ValueSources::new()
            .with_values(Values(json!({"a": "doc", "b": "doc", "c": "doc", "d": "doc"})))
            .with_set(SetValue::new("b", "set"))
            .with_set(SetValue::new("c", "set"))
            .with_sensitive(SetValue::new("c", "sensitive"))
            .with_sensitive(SetValue::new("d", "sensitive"))
            .with_list(SetListValue::new("d", ["list"]))
            .compose()
            .unwrap();

        assert_eq!(
            composed.values.0,
            json!({"a": "doc", "b": "set", "c": "sensitive", "d": ["list"]})
        );
    }

    #[test]
    fn test_string_type_keeps_strings() {
        let composed = ValueSources::new()
            .with_set(SetValue::new("port", "8080").typed(TypeHint::String))
            .with_set(SetValue::new("replicas", "3"))
            .compose()
            .unwrap();

        assert_eq!(composed.values.0, json!({"port": "8080", "replicas": 3}));
    }

    #[test]
    fn test_list_override_drops_blanks() {
        let composed = ValueSources::new()
            .with_list(SetListValue::new("name", ["x", "", "y", "", "z"]))
            .compose()
            .unwrap();

        assert_eq!(composed.values.0, json!({"name": ["x", "y", "z"]}));
    }

    #[test]
    fn test_list_override_typing_and_empty() {
        let composed = ValueSources::new()
            .with_list(SetListValue::new("ports", ["80", "443"]))
            .with_list(SetListValue::new("empty", Vec::<String>::new()))
            .compose()
            .unwrap();

        assert_eq!(composed.values.0, json!({"ports": [80, 443], "empty": []}));
    }

    #[test]
    fn test_sensitive_overrides_are_recorded() {
        let composed = ValueSources::new()
            .with_sensitive(SetValue::new("auth.password", "hunter2"))
            .compose()
            .unwrap();

        assert_eq!(composed.values.get("auth.password").unwrap(), "hunter2");
        assert_eq!(composed.redactions.paths(), ["auth.password".to_string()]);
        assert!(composed.redactions.secrets().any(|s| s == "hunter2"));

        let cloaked = composed.cloaked();
        assert_eq!(cloaked.get("auth.password").unwrap(), SENSITIVE_PLACEHOLDER);
        // The render tree is untouched
        assert_eq!(composed.values.get("auth.password").unwrap(), "hunter2");
    }

    #[test]
    fn test_escaped_sensitive_value_recorded_unescaped() {
        let composed = ValueSources::new()
            .with_sensitive(SetValue::new("token", r"a\,b"))
            .compose()
            .unwrap();

        assert_eq!(composed.values.get("token").unwrap(), "a,b");
        assert!(composed.redactions.secrets().any(|s| s == "a,b"));
    }

    #[test]
    fn test_sensitive_list_items_are_recorded() {
        let composed = ValueSources::new()
            .with_values(Values(json!({"auth": {"user": "admin"}})))
            .with_sensitive(SetValue::new("auth.tokens", "{tok-alpha,tok-beta}"))
            .compose()
            .unwrap();

        assert_eq!(
            composed.values.get("auth.tokens").unwrap(),
            &json!(["tok-alpha", "tok-beta"])
        );
        assert_eq!(composed.redactions.paths(), ["auth.tokens".to_string()]);

        let text = composed
            .redactions
            .fingerprint("token: tok-alpha\nother: tok-beta\n");
        assert!(!text.contains("tok-alpha"));
        assert!(!text.contains("tok-beta"));

        let cloaked = composed.cloaked();
        assert_eq!(cloaked.get("auth.tokens").unwrap(), SENSITIVE_PLACEHOLDER);
        assert_eq!(cloaked.get("auth.user").unwrap(), "admin");
    }

    #[test]
    fn test_sensitive_expression_records_every_assignment() {
        let composed = ValueSources::new()
            .with_sensitive(SetValue::new("a", "s1,b=s2,c.d=s3"))
            .compose()
            .unwrap();

        assert_eq!(
            composed.redactions.paths(),
            ["a".to_string(), "b".to_string(), "c.d".to_string()]
        );

        let cloaked = composed.cloaked();
        assert_eq!(
            cloaked.0,
            json!({
                "a": SENSITIVE_PLACEHOLDER,
                "b": SENSITIVE_PLACEHOLDER,
                "c": {"d": SENSITIVE_PLACEHOLDER}
            })
        );

        let text = composed.redactions.fingerprint("s1 s2 s3");
        assert!(!text.contains("s1"));
        assert!(!text.contains("s2"));
        assert!(!text.contains("s3"));
    }

    #[test]
    fn test_sensitive_dotted_key_path_is_escaped() {
        let composed = ValueSources::new()
            .with_sensitive(SetValue::new(r"annotations.example\.com/token", "tok"))
            .compose()
            .unwrap();

        assert_eq!(
            composed.redactions.paths(),
            [r"annotations.example\.com/token".to_string()]
        );
        let cloaked = composed.cloaked();
        assert_eq!(
            cloaked.0,
            json!({"annotations": {"example.com/token": SENSITIVE_PLACEHOLDER}})
        );
    }

    #[test]
    fn test_error_names_source_path_and_value() {
        let err = ValueSources::new()
            .with_set(SetValue::new("list[x]", "1"))
            .compose()
            .unwrap_err();

        assert_eq!(err.source_kind(), Some(SourceKind::Set));
        let msg = err.to_string();
        assert!(msg.contains("set"));
        assert!(msg.contains("\"list[x]\""));
        assert!(msg.contains("with value 1"));
        match err {
            CoreError::Parse { cause, .. } => {
                assert_eq!(cause, StrvalsError::InvalidIndex("x".into()))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sensitive_error_hides_value() {
        let err = ValueSources::new()
            .with_sensitive(SetValue::new("", "hunter2"))
            .compose()
            .unwrap_err();

        assert_eq!(err.source_kind(), Some(SourceKind::SetSensitive));
        let msg = err.to_string();
        assert!(!msg.contains("hunter2"));
        assert!(msg.contains("(sensitive value "));
    }

    #[test]
    fn test_list_error_is_reported() {
        let err = ValueSources::new()
            .with_list(SetListValue::new("", ["a"]))
            .compose()
            .unwrap_err();

        assert_eq!(err.source_kind(), Some(SourceKind::SetList));
        assert!(err.to_string().contains("with value a"));
    }

    #[test]
    fn test_failure_aborts_whole_composition() {
        let result = ValueSources::new()
            .with_set(SetValue::new("ok", "1"))
            .with_set(SetValue::new("bad", "{x"))
            .compose();

        assert!(result.is_err());
    }

    #[test]
    fn test_parse_arg() {
        let set = SetValue::parse_arg(r"a\=b.c=x=y", TypeHint::Auto).unwrap();
        assert_eq!(set.name, r"a\=b.c");
        assert_eq!(set.value, "x=y");
        assert!(SetValue::parse_arg("novalue", TypeHint::Auto).is_none());
    }

    #[test]
    fn test_sources_from_yaml_config() {
        let sources: ValueSources = serde_yaml::from_str(
            r#"
values:
  - image:
      repository: nginx
set:
  - name: image.tag
    value: "1.25"
    type: string
setSensitive:
  - name: auth.password
    value: hunter2
setList:
  - name: hosts
    value: [a.example.com, "", b.example.com]
"#,
        )
        .unwrap();

        assert_eq!(sources.set[0].value_type, TypeHint::String);
        assert_eq!(sources.set_sensitive[0].value_type, TypeHint::Auto);

        let composed = sources.compose().unwrap();
        assert_eq!(
            composed.values.0,
            json!({
                "image": {"repository": "nginx", "tag": "1.25"},
                "auth": {"password": "hunter2"},
                "hosts": ["a.example.com", "b.example.com"]
            })
        );
    }

    #[test]
    fn test_config_accepts_non_string_scalars() {
        let sources: ValueSources = serde_yaml::from_str(
            "set:\n  - name: replicas\n    value: 3\nsetList:\n  - name: ports\n    value: [80, true]\n",
        )
        .unwrap();

        assert_eq!(sources.set[0].value, "3");
        assert_eq!(sources.set_list[0].value, vec!["80", "true"]);
    }

    #[test]
    fn test_load_from_file() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release.yaml");
        std::fs::write(
            &path,
            "values:\n  - replicas: 1\nset:\n  - name: replicas\n    value: \"2\"\n",
        )
        .unwrap();

        let composed = ValueSources::load_from(&path).unwrap().compose().unwrap();
        assert_eq!(composed.values.0, json!({"replicas": 2}));
        assert!(composed.redactions.is_empty());

        let missing = ValueSources::load_from(&dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(CoreError::Io(_))));
    }

    #[test]
    fn test_unknown_type_rejected_in_config() {
        let result: std::result::Result<ValueSources, _> =
            serde_yaml::from_str("set:\n  - name: a\n    value: b\n    type: json\n");
        assert!(result.is_err());
    }
}
