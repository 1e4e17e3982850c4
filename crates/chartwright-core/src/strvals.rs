//! Parser for `--set` style path assignments
//!
//! An expression is one or more comma-separated assignments:
//!
//! ```text
//! image.tag=1.25
//! servers[0].port=80,servers[0].host=example.com
//! ingress.hosts={a.example.com,b.example.com}
//! annotations.kubernetes\.io/ingress\.class=nginx
//! ```
//!
//! A backslash escapes the next character, so `\.`, `\,`, `\=`, `\{` and `\}`
//! can appear inside keys and values. Intermediate maps and lists are created
//! on demand. When the shape at a path disagrees with the assignment (a map
//! written over a list, a scalar written over a map, ...) the new value
//! replaces the old one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest list index an assignment may address (exclusive)
pub const MAX_INDEX: usize = 65536;

/// Deepest chain of dotted keys an assignment may address
pub const MAX_NESTED_NAME_LEVEL: usize = 30;

/// How the right-hand side of an assignment is typed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeHint {
    /// Integers, booleans and `null` are coerced, everything else is a string
    #[default]
    #[serde(alias = "")]
    Auto,
    /// Values are always strings; lists are still recognised
    String,
    /// Everything after the first `=` is stored verbatim
    Literal,
}

impl TypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeHint::Auto => "auto",
            TypeHint::String => "string",
            TypeHint::Literal => "literal",
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeHint {
    type Err = StrvalsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "auto" => Ok(TypeHint::Auto),
            "string" => Ok(TypeHint::String),
            "literal" => Ok(TypeHint::Literal),
            other => Err(StrvalsError::UnknownType(other.to_string())),
        }
    }
}

/// Reasons an assignment expression is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrvalsError {
    #[error("key {0:?} has no value")]
    NoValue(String),

    #[error("key {0:?} has no value (cannot end with ,)")]
    TrailingComma(String),

    #[error("key map {0:?} has no value")]
    EmptyMap(String),

    #[error("assignment has an empty key")]
    EmptyKey,

    #[error("list must terminate with '}}'")]
    UnterminatedList,

    #[error("unexpected data after list: {0:?}")]
    TrailingListData(String),

    #[error("error parsing index: {0:?} is not a valid index")]
    InvalidIndex(String),

    #[error("negative {0} index not allowed")]
    NegativeIndex(i64),

    #[error("index of {0} is greater than maximum supported index of {max}", max = MAX_INDEX)]
    IndexTooLarge(usize),

    #[error("unexpected data at end of array index: {0:?}")]
    TrailingIndexData(String),

    #[error(
        "value name nested level is greater than maximum supported nested level of {max}",
        max = MAX_NESTED_NAME_LEVEL
    )]
    TooDeep,

    #[error("unexpected token {0:?}")]
    UnexpectedToken(char),

    #[error("unknown value type {0:?}, expected one of: auto, string, literal")]
    UnknownType(String),
}

pub type Result<T> = std::result::Result<T, StrvalsError>;

/// Parse `expr` and apply every assignment in it to `dest`
pub fn parse_into(expr: &str, dest: &mut Map<String, JsonValue>, hint: TypeHint) -> Result<()> {
    let mut parser = Parser::new(expr, hint);
    while parser.key(dest, 0)? == Flow::More {}
    Ok(())
}

/// Parse `expr` into a fresh map
pub fn parse(expr: &str, hint: TypeHint) -> Result<Map<String, JsonValue>> {
    let mut dest = Map::new();
    parse_into(expr, &mut dest, hint)?;
    Ok(dest)
}

/// Whether the parser has more assignments to read after the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    More,
    End,
}

struct Parser {
    input: Vec<char>,
    pos: usize,
    hint: TypeHint,
}

impl Parser {
    fn new(expr: &str, hint: TypeHint) -> Self {
        Self {
            input: expr.chars().collect(),
            pos: 0,
            hint,
        }
    }

    fn next(&mut self) -> Option<char> {
        let c = self.input.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    /// Remaining input, verbatim
    fn rest(&mut self) -> String {
        let rest: String = self.input[self.pos..].iter().collect();
        self.pos = self.input.len();
        rest
    }

    /// Read up to (and consume) the first unescaped stop character
    ///
    /// Returns the unescaped text and the stop character, or `None` at the
    /// end of input.
    fn runes_until(&mut self, stop: &[char]) -> (String, Option<char>) {
        let mut text = String::new();
        while let Some(c) = self.next() {
            if stop.contains(&c) {
                return (text, Some(c));
            }
            if c == '\\' {
                // A trailing backslash is kept as-is
                text.push(self.next().unwrap_or('\\'));
            } else {
                text.push(c);
            }
        }
        (text, None)
    }

    fn key(&mut self, data: &mut Map<String, JsonValue>, level: usize) -> Result<Flow> {
        let (key, last) = self.runes_until(&['=', '[', ',', '.']);
        match last {
            None if key.is_empty() => Ok(Flow::End),
            None => Err(StrvalsError::NoValue(key)),
            Some(',') => Err(StrvalsError::TrailingComma(key)),
            Some(_) if key.is_empty() => Err(StrvalsError::EmptyKey),
            Some('=') => {
                let (value, flow) = self.value()?;
                data.insert(key, value);
                Ok(flow)
            }
            Some('[') => {
                let index = self.key_index()?;
                let list = match data.remove(&key) {
                    Some(JsonValue::Array(list)) => list,
                    _ => Vec::new(),
                };
                let (list, flow) = self.list_item(list, index, level, &key)?;
                data.insert(key, JsonValue::Array(list));
                Ok(flow)
            }
            Some('.') => {
                let level = level + 1;
                if level > MAX_NESTED_NAME_LEVEL {
                    return Err(StrvalsError::TooDeep);
                }
                let mut inner = match data.remove(&key) {
                    Some(JsonValue::Object(map)) => map,
                    _ => Map::new(),
                };
                let flow = self.key(&mut inner, level)?;
                if inner.is_empty() {
                    return Err(StrvalsError::EmptyMap(key));
                }
                data.insert(key, JsonValue::Object(inner));
                Ok(flow)
            }
            Some(other) => Err(StrvalsError::UnexpectedToken(other)),
        }
    }

    /// Right-hand side of an assignment: a `{...}` list or a scalar
    fn value(&mut self) -> Result<(JsonValue, Flow)> {
        if self.hint == TypeHint::Literal {
            return Ok((JsonValue::String(self.rest()), Flow::End));
        }

        if let Some((items, flow)) = self.list()? {
            return Ok((JsonValue::Array(items), flow));
        }

        let (raw, last) = self.runes_until(&[',']);
        let flow = if last.is_some() { Flow::More } else { Flow::End };
        Ok((self.typed(raw), flow))
    }

    fn list(&mut self) -> Result<Option<(Vec<JsonValue>, Flow)>> {
        if self.peek() != Some('{') {
            return Ok(None);
        }
        self.pos += 1;

        let mut items = Vec::new();
        loop {
            let (raw, last) = self.runes_until(&[',', '}']);
            match last {
                None => return Err(StrvalsError::UnterminatedList),
                Some(',') => items.push(self.typed(raw)),
                Some('}') => {
                    // `{}` is an empty list rather than a list holding ""
                    if !(raw.is_empty() && items.is_empty()) {
                        items.push(self.typed(raw));
                    }
                    return match self.next() {
                        None => Ok(Some((items, Flow::End))),
                        Some(',') => Ok(Some((items, Flow::More))),
                        Some(c) => {
                            let mut trailing = c.to_string();
                            trailing.push_str(&self.rest());
                            Err(StrvalsError::TrailingListData(trailing))
                        }
                    };
                }
                Some(other) => return Err(StrvalsError::UnexpectedToken(other)),
            }
        }
    }

    /// Index between `[` and `]`; the opening bracket is already consumed
    fn key_index(&mut self) -> Result<usize> {
        let (raw, last) = self.runes_until(&[']']);
        if last.is_none() {
            return Err(StrvalsError::InvalidIndex(raw));
        }
        let index: i64 = raw
            .parse()
            .map_err(|_| StrvalsError::InvalidIndex(raw.clone()))?;
        let index = usize::try_from(index).map_err(|_| StrvalsError::NegativeIndex(index))?;
        if index >= MAX_INDEX {
            return Err(StrvalsError::IndexTooLarge(index));
        }
        Ok(index)
    }

    fn list_item(
        &mut self,
        mut list: Vec<JsonValue>,
        index: usize,
        level: usize,
        name: &str,
    ) -> Result<(Vec<JsonValue>, Flow)> {
        let name = format!("{name}[{index}]");
        let (data, last) = self.runes_until(&['[', '.', '=']);
        if !data.is_empty() {
            return Err(StrvalsError::TrailingIndexData(data));
        }

        match last {
            None => Err(StrvalsError::NoValue(name)),
            Some('=') => {
                let (value, flow) = self.value()?;
                Ok((set_index(list, index, value), flow))
            }
            Some('[') => {
                let next = self.key_index()?;
                let nested = match list.get_mut(index).map(JsonValue::take) {
                    Some(JsonValue::Array(nested)) => nested,
                    _ => Vec::new(),
                };
                let (nested, flow) = self.list_item(nested, next, level, &name)?;
                Ok((set_index(list, index, JsonValue::Array(nested)), flow))
            }
            Some('.') => {
                let mut inner = match list.get_mut(index).map(JsonValue::take) {
                    Some(JsonValue::Object(map)) => map,
                    _ => Map::new(),
                };
                let flow = self.key(&mut inner, level)?;
                if inner.is_empty() {
                    return Err(StrvalsError::EmptyMap(name));
                }
                Ok((set_index(list, index, JsonValue::Object(inner)), flow))
            }
            Some(other) => Err(StrvalsError::UnexpectedToken(other)),
        }
    }

    fn typed(&self, raw: String) -> JsonValue {
        match self.hint {
            TypeHint::Auto => auto_typed(raw),
            TypeHint::String | TypeHint::Literal => JsonValue::String(raw),
        }
    }
}

/// Coerce a token the way `--set` does
///
/// Only integers are coerced to numbers; a leading zero (`0123`) keeps the
/// token a string so zip codes and octal-looking ids survive.
fn auto_typed(raw: String) -> JsonValue {
    if raw.eq_ignore_ascii_case("true") {
        return JsonValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return JsonValue::Bool(false);
    }
    if raw.eq_ignore_ascii_case("null") {
        return JsonValue::Null;
    }
    if raw == "0" {
        return JsonValue::from(0i64);
    }
    if !raw.starts_with('0') {
        if let Ok(n) = raw.parse::<i64>() {
            return JsonValue::from(n);
        }
    }
    JsonValue::String(raw)
}

fn set_index(mut list: Vec<JsonValue>, index: usize, value: JsonValue) -> Vec<JsonValue> {
    if list.len() <= index {
        list.resize(index + 1, JsonValue::Null);
    }
    list[index] = value;
    list
}

/// Render a values tree back into assignment expressions
///
/// Re-parsing the output with [`TypeHint::Auto`] rebuilds the same tree for
/// trees of strings, integers, booleans and nulls. Empty maps have no
/// assignment form and are omitted.
pub fn to_assignments(tree: &Map<String, JsonValue>) -> Vec<String> {
    let mut out = Vec::new();
    for (key, value) in tree {
        flatten(&escape_key(key), value, &mut out);
    }
    out
}

fn flatten(path: &str, value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                flatten(&format!("{path}.{}", escape_key(key)), child, out);
            }
        }
        JsonValue::Array(items) if items.iter().all(is_scalar) => {
            let rendered: Vec<String> = items.iter().map(render_scalar).collect();
            out.push(format!("{path}={{{}}}", rendered.join(",")));
        }
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten(&format!("{path}[{i}]"), item, out);
            }
        }
        scalar => out.push(format!("{path}={}", render_scalar(scalar))),
    }
}

fn is_scalar(value: &JsonValue) -> bool {
    !matches!(value, JsonValue::Object(_) | JsonValue::Array(_))
}

fn render_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => escape_value(s),
        JsonValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn escape_with(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Remove backslash escapes the way the parser does
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next().unwrap_or('\\'));
        } else {
            out.push(c);
        }
    }
    out
}

/// Escape a map key for use in an assignment path
pub fn escape_key(key: &str) -> String {
    escape_with(key, &['\\', '.', ',', '=', '['])
}

/// Escape a scalar for use on the right-hand side of an assignment
pub fn escape_value(value: &str) -> String {
    escape_with(value, &['\\', ',', '{', '}'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(expr: &str) -> JsonValue {
        JsonValue::Object(parse(expr, TypeHint::Auto).unwrap())
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(parsed("name=value"), json!({"name": "value"}));
        assert_eq!(parsed("a.b.c=1"), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_multiple_assignments() {
        assert_eq!(
            parsed("a=1,b=two,c.d=true"),
            json!({"a": 1, "b": "two", "c": {"d": true}})
        );
    }

    #[test]
    fn test_auto_typing() {
        assert_eq!(parsed("a=true"), json!({"a": true}));
        assert_eq!(parsed("a=FALSE"), json!({"a": false}));
        assert_eq!(parsed("a=null"), json!({"a": null}));
        assert_eq!(parsed("a=0"), json!({"a": 0}));
        assert_eq!(parsed("a=-42"), json!({"a": -42}));
        assert_eq!(parsed("a=0123"), json!({"a": "0123"}));
        assert_eq!(parsed("a=1.5"), json!({"a": "1.5"}));
        assert_eq!(parsed("a=99999999999999999999"), json!({"a": "99999999999999999999"}));
    }

    #[test]
    fn test_string_typing() {
        let tree = parse("a=true,b=42,c={1,2}", TypeHint::String).unwrap();
        assert_eq!(
            JsonValue::Object(tree),
            json!({"a": "true", "b": "42", "c": ["1", "2"]})
        );
    }

    #[test]
    fn test_literal_typing() {
        let tree = parse(r"a.b={x,y},c=d\,e", TypeHint::Literal).unwrap();
        assert_eq!(JsonValue::Object(tree), json!({"a": {"b": r"{x,y},c=d\,e"}}));
    }

    #[test]
    fn test_empty_value() {
        assert_eq!(parsed("a="), json!({"a": ""}));
        assert_eq!(parsed("a=,b=1"), json!({"a": "", "b": 1}));
    }

    #[test]
    fn test_lists() {
        assert_eq!(parsed("a={x,y,z}"), json!({"a": ["x", "y", "z"]}));
        assert_eq!(parsed("a={1,true}"), json!({"a": [1, true]}));
        assert_eq!(parsed("a={}"), json!({"a": []}));
        assert_eq!(parsed("a={x},b=1"), json!({"a": ["x"], "b": 1}));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(parsed(r"a\.b=c"), json!({"a.b": "c"}));
        assert_eq!(parsed(r"a=b\,c"), json!({"a": "b,c"}));
        assert_eq!(parsed(r"a=x\=y"), json!({"a": "x=y"}));
        assert_eq!(parsed(r"a=\{x\}"), json!({"a": "{x}"}));
        assert_eq!(parsed(r"a={x\,y,z}"), json!({"a": ["x,y", "z"]}));
        assert_eq!(
            parsed(r"annotations.kubernetes\.io/ingress\.class=nginx"),
            json!({"annotations": {"kubernetes.io/ingress.class": "nginx"}})
        );
    }

    #[test]
    fn test_indexed_lists() {
        assert_eq!(parsed("a[0]=x"), json!({"a": ["x"]}));
        assert_eq!(parsed("a[2]=x"), json!({"a": [null, null, "x"]}));
        assert_eq!(
            parsed("servers[0].port=80,servers[0].host=example.com"),
            json!({"servers": [{"port": 80, "host": "example.com"}]})
        );
        assert_eq!(parsed("m[1][0]=y"), json!({"m": [null, ["y"]]}));
        assert_eq!(parsed("a[0]={x,y}"), json!({"a": [["x", "y"]]}));
    }

    #[test]
    fn test_merges_into_existing_map() {
        let mut dest = json!({"a": {"b": 1}}).as_object().cloned().unwrap();
        parse_into("a.c=2", &mut dest, TypeHint::Auto).unwrap();
        assert_eq!(JsonValue::Object(dest), json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn test_shape_conflicts_overwrite() {
        let mut dest = json!({"a": {"b": {"c": 1}}}).as_object().cloned().unwrap();
        parse_into("a.b=2", &mut dest, TypeHint::Auto).unwrap();
        assert_eq!(JsonValue::Object(dest.clone()), json!({"a": {"b": 2}}));

        parse_into("a.b.c=3", &mut dest, TypeHint::Auto).unwrap();
        assert_eq!(JsonValue::Object(dest.clone()), json!({"a": {"b": {"c": 3}}}));

        parse_into("a[1]=x", &mut dest, TypeHint::Auto).unwrap();
        assert_eq!(JsonValue::Object(dest.clone()), json!({"a": [null, "x"]}));

        parse_into("a={y}", &mut dest, TypeHint::Auto).unwrap();
        assert_eq!(JsonValue::Object(dest), json!({"a": ["y"]}));
    }

    #[test]
    fn test_existing_list_items_are_updated() {
        let mut dest = json!({"a": [{"name": "x", "port": 1}, "keep"]})
            .as_object()
            .cloned()
            .unwrap();
        parse_into("a[0].port=2", &mut dest, TypeHint::Auto).unwrap();
        assert_eq!(
            JsonValue::Object(dest),
            json!({"a": [{"name": "x", "port": 2}, "keep"]})
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("name", TypeHint::Auto), Err(StrvalsError::NoValue("name".into())));
        assert_eq!(parse("=1", TypeHint::Auto), Err(StrvalsError::EmptyKey));
        assert_eq!(parse(".a=1", TypeHint::Auto), Err(StrvalsError::EmptyKey));
        assert_eq!(parse("a={x,y", TypeHint::Auto), Err(StrvalsError::UnterminatedList));
        assert_eq!(
            parse("a={x}y", TypeHint::Auto),
            Err(StrvalsError::TrailingListData("y".into()))
        );
        assert_eq!(
            parse("a,b=1", TypeHint::Auto),
            Err(StrvalsError::TrailingComma("a".into()))
        );
        assert_eq!(parse("a[x]=1", TypeHint::Auto), Err(StrvalsError::InvalidIndex("x".into())));
        assert_eq!(parse("a[-1]=1", TypeHint::Auto), Err(StrvalsError::NegativeIndex(-1)));
        assert_eq!(
            parse("a[65536]=1", TypeHint::Auto),
            Err(StrvalsError::IndexTooLarge(65536))
        );
        assert_eq!(
            parse("a[0]b=1", TypeHint::Auto),
            Err(StrvalsError::TrailingIndexData("b".into()))
        );
        assert_eq!(parse("a[0]", TypeHint::Auto), Err(StrvalsError::NoValue("a[0]".into())));
        assert_eq!(parse("a.", TypeHint::Auto), Err(StrvalsError::EmptyMap("a".into())));
    }

    #[test]
    fn test_too_deep() {
        let deep = format!("{}=1", vec!["k"; MAX_NESTED_NAME_LEVEL + 2].join("."));
        assert_eq!(parse(&deep, TypeHint::Auto), Err(StrvalsError::TooDeep));

        let ok = format!("{}=1", vec!["k"; MAX_NESTED_NAME_LEVEL + 1].join("."));
        assert!(parse(&ok, TypeHint::Auto).is_ok());
    }

    #[test]
    fn test_empty_expression_is_noop() {
        assert!(parse("", TypeHint::Auto).unwrap().is_empty());
    }

    #[test]
    fn test_type_hint_from_str() {
        assert_eq!("".parse::<TypeHint>().unwrap(), TypeHint::Auto);
        assert_eq!("auto".parse::<TypeHint>().unwrap(), TypeHint::Auto);
        assert_eq!("string".parse::<TypeHint>().unwrap(), TypeHint::String);
        assert_eq!("literal".parse::<TypeHint>().unwrap(), TypeHint::Literal);
        assert_eq!(
            "json".parse::<TypeHint>(),
            Err(StrvalsError::UnknownType("json".into()))
        );
    }

    #[test]
    fn test_assignments_roundtrip() {
        let tree = json!({
            "image": {"repository": "nginx", "tag": "v1.25", "pullSecrets": []},
            "replicas": 3,
            "debug": false,
            "hosts": ["a.example.com", "b,example.com"],
            "servers": [{"name": "web", "port": 80}, {"name": "api", "port": 8080}],
            "annotations": {"kubernetes.io/ingress.class": "nginx"},
            "weird": "x=y{z}",
            "nothing": null
        });
        let tree = tree.as_object().cloned().unwrap();

        let mut rebuilt = Map::new();
        for expr in to_assignments(&tree) {
            parse_into(&expr, &mut rebuilt, TypeHint::Auto).unwrap();
        }

        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\,b\\c\.d"), r"a,b\c.d");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_to_assignments_escapes_keys() {
        let tree = json!({"a.b": {"c": "d,e"}}).as_object().cloned().unwrap();
        assert_eq!(to_assignments(&tree), vec![r"a\.b.c=d\,e".to_string()]);
    }
}
