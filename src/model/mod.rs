//! Parsed declaration model shared by the scanner, resolver, validator and
//! generator. Components are created once per source file, rewritten in
//! place by the resolver, and consumed immutably by the generator.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One parsed annotation payload entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Bare entry: `TypeOwned`.
    Flag,
    /// `Name=value`, one layer of surrounding quotes stripped.
    KeyValue(String),
    /// `Name(payload)`, payload parsed recursively.
    Group(AttributeMap),
}

/// Attribute lookup by name; last-write-wins on duplicates.
pub type AttributeMap = BTreeMap<String, Attribute>;

/// Returns the string payload of a `KeyValue` attribute, if present.
pub fn attr_value<'a>(attrs: &'a AttributeMap, name: &str) -> Option<&'a str> {
    match attrs.get(name) {
        Some(Attribute::KeyValue(value)) => Some(value.as_str()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub path: PathBuf,
    pub line: usize,
}

impl SourceLoc {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// Declaration modifier keywords recognized in front of a member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub is_const: bool,
    pub is_constexpr: bool,
    pub is_static: bool,
    pub is_extern: bool,
    pub is_inline: bool,
    pub is_virtual: bool,
    pub is_explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: String,
    pub default: Option<String>,
    pub is_const: bool,
    pub attrs: AttributeMap,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            is_const: false,
            attrs: AttributeMap::new(),
        }
    }
}

/// A tagged function declaration; also used for constructors (no return
/// type, name left empty) and destructors.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: Option<String>,
    pub python_name: Option<String>,
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
    pub modifiers: Modifiers,
    pub attrs: AttributeMap,
    pub module: Option<String>,
    pub loc: Option<SourceLoc>,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Property {
    pub name: Option<String>,
    pub python_name: Option<String>,
    pub ty: Option<String>,
    pub value: Option<String>,
    pub modifiers: Modifiers,
    pub attrs: AttributeMap,
    pub module: Option<String>,
    pub loc: Option<SourceLoc>,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Operator {
    pub spelling: Option<String>,
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
    pub modifiers: Modifiers,
    pub attrs: AttributeMap,
    pub module: Option<String>,
    pub loc: Option<SourceLoc>,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
    Protected,
}

impl Access {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "public" => Some(Access::Public),
            "private" => Some(Access::Private),
            "protected" => Some(Access::Protected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseType {
    pub name: String,
    pub access: Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Class,
    Struct,
}

impl ComponentKind {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "class" => Some(ComponentKind::Class),
            "struct" => Some(ComponentKind::Struct),
            _ => None,
        }
    }
}

/// The declaration unit for one tagged type, or the synthetic per-file
/// "globals" record holding file-scope declarations (`name` is `None`).
#[derive(Debug, Clone, Default)]
pub struct Component {
    pub kind: Option<ComponentKind>,
    /// Namespace-qualified type name; `None` for the globals component.
    pub name: Option<String>,
    pub python_name: Option<String>,
    /// Kind label from the tag vocabulary ("class", "struct").
    pub tag: Option<String>,
    pub base_types: Vec<BaseType>,
    pub attrs: AttributeMap,
    pub properties: Vec<Property>,
    pub functions: Vec<Function>,
    pub operators: Vec<Operator>,
    pub constructors: Vec<Function>,
    pub destructors: Vec<Function>,
    pub module: Option<String>,
    pub requires: Vec<String>,
    pub loc: Option<SourceLoc>,
}

impl Component {
    pub fn globals(path: impl Into<PathBuf>) -> Self {
        Self {
            loc: Some(SourceLoc::new(path, 0)),
            ..Self::default()
        }
    }

    pub fn is_globals(&self) -> bool {
        self.name.is_none()
    }
}

/// Strips the namespace qualifier: `a::b::Foo*` -> `Foo*`.
pub fn type_without_namespace(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

/// Strips namespace and trailing `*`/`&`: `a::Foo*` -> `Foo`.
pub fn type_name_without_namespace(name: &str) -> &str {
    type_without_namespace(name).trim_end_matches(['*', '&'])
}

/// Additionally strips a template argument list: `Span<int>` -> `Span`.
pub fn non_template_name(name: &str) -> &str {
    let clean = type_name_without_namespace(name);
    clean.split('<').next().unwrap_or(clean)
}

/// Splits a qualified name into `(namespace-with-trailing-colons, name)`.
pub fn split_namespace(name: &str) -> (String, String) {
    match name.rsplit_once("::") {
        Some((ns, last)) => (format!("{ns}::"), last.to_string()),
        None => (String::new(), name.to_string()),
    }
}

/// Derives the exposed Python name: an explicit name wins, otherwise the
/// unqualified C++ name converted to snake_case (a maximal uppercase run
/// becomes one lowercased segment).
pub fn python_name(explicit: Option<&str>, cpp_name: &str) -> String {
    if let Some(name) = explicit {
        return name.to_string();
    }
    let (_, last) = split_namespace(cpp_name);
    let mut out = String::with_capacity(last.len() + 4);
    let mut in_upper_run = false;
    for ch in last.chars() {
        if ch.is_ascii_uppercase() {
            if !in_upper_run {
                out.push('_');
                in_upper_run = true;
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            in_upper_run = false;
            out.push(ch);
        }
    }
    out.trim_start_matches('_').to_string()
}

/// `(namespace, unqualified name, python name)` for a named entity.
pub fn qualified_parts(name: &str, explicit_py: Option<&str>) -> (String, String, String) {
    let (namespace, last) = split_namespace(name);
    let py = python_name(explicit_py, name);
    (namespace, last, py)
}

/// Rejection message for the four structurally unsupported type spellings,
/// or `None` when the spelling is acceptable.
pub fn unsupported_spelling(ty: &str) -> Option<&'static str> {
    if ty.ends_with("&&") {
        Some("rvalue references (&&) are not supported")
    } else if ty.ends_with("&*") {
        Some("pointer to reference is not supported")
    } else if ty.ends_with("*&") {
        Some("reference to pointer is not supported")
    } else if ty.ends_with("**") {
        Some("pointer to pointer is not supported")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_name_splits_uppercase_runs() {
        assert_eq!(python_name(None, "GetValue"), "get_value");
        assert_eq!(python_name(None, "Tiny::IO::ReadHTTPHeader"), "read_httpheader");
        assert_eq!(python_name(Some("custom"), "GetValue"), "custom");
    }

    #[test]
    fn name_helpers_strip_suffixes() {
        assert_eq!(type_without_namespace("a::b::Foo*"), "Foo*");
        assert_eq!(type_name_without_namespace("a::Foo*"), "Foo");
        assert_eq!(non_template_name("Span<int>"), "Span");
    }

    #[test]
    fn unsupported_spellings_are_exactly_four() {
        for bad in ["int&&", "int&*", "int*&", "int**"] {
            assert!(unsupported_spelling(bad).is_some(), "{bad}");
        }
        for ok in ["int", "int*", "int&", "const char*", "Span<int>"] {
            assert!(unsupported_spelling(ok).is_none(), "{ok}");
        }
    }
}
