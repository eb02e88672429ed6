//! Hand-rolled line matchers for the declaration grammar. Each matcher
//! recognizes one line shape the scanner cares about and hands back the
//! unconsumed suffix where a tag may share a physical line with its
//! declaration. Matchers are permissive the same way the original grammar
//! was: a line that fits no matcher is simply not part of the API surface.

use crate::model::{Access, BaseType, ComponentKind, Modifiers, Parameter};
use crate::scanner::attributes::parse_attributes;

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn is_type_char(ch: char) -> bool {
    is_ident_char(ch) || matches!(ch, ':' | '<' | '>' | '*' | '&' | ',')
}

/// Consumes a leading identifier, returning `(ident, rest)`.
fn eat_ident(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !is_ident_char(c)).unwrap_or(s.len());
    if end == 0 || s.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    Some((&s[..end], &s[end..]))
}

/// Consumes `word` only when followed by a non-identifier character.
fn eat_keyword<'a>(s: &'a str, word: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(word)?;
    match rest.chars().next() {
        Some(ch) if is_ident_char(ch) => None,
        _ => Some(rest),
    }
}

/// Consumes a maximal type-spelling run (`a::b::Map<K,V>*`).
fn eat_type(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !is_type_char(c)).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((&s[..end], &s[end..]))
}

/// Consumes a balanced `(...)` group, returning `(contents, rest)`.
fn eat_balanced_parens(s: &str) -> Option<(&str, &str)> {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, '(')) => {}
        _ => return None,
    }
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in chars {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..idx], &s[idx + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Consumes a C++ `[[...]]` attribute block if present.
fn eat_attr_block(s: &str) -> &str {
    if let Some(rest) = s.strip_prefix("[[") {
        if let Some(end) = rest.find("]]") {
            return rest[end + 2..].trim_start();
        }
    }
    s
}

/// Parses leading modifier keywords out of `allowed`, in any order.
fn eat_modifiers<'a>(mut s: &'a str, allowed: &[&str]) -> (Modifiers, &'a str) {
    let mut modifiers = Modifiers::default();
    'outer: loop {
        s = s.trim_start();
        for word in allowed {
            if let Some(rest) = eat_keyword(s, word) {
                match *word {
                    "const" => modifiers.is_const = true,
                    "constexpr" => modifiers.is_constexpr = true,
                    "static" => modifiers.is_static = true,
                    "extern" => modifiers.is_extern = true,
                    "inline" => modifiers.is_inline = true,
                    "virtual" => modifiers.is_virtual = true,
                    "explicit" => modifiers.is_explicit = true,
                    _ => {}
                }
                s = rest;
                continue 'outer;
            }
        }
        return (modifiers, s);
    }
}

const MEMBER_MODIFIERS: &[&str] = &[
    "virtual",
    "constexpr",
    "const",
    "inline",
    "static",
    "extern",
];
const CTOR_MODIFIERS: &[&str] = &["constexpr", "virtual", "explicit", "inline"];
const DTOR_MODIFIERS: &[&str] = &["virtual", "inline"];

/// `#include "path"` / `#include <path>`, delimiters preserved.
pub fn match_header(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = eat_keyword(rest, "include")?.trim_start();
    let open = rest.chars().next()?;
    let close = match open {
        '"' => '"',
        '<' => '>',
        _ => return None,
    };
    let end = rest[1..].find(close)? + 1;
    Some(rest[..=end].to_string())
}

/// `TagName(payload) rest` — the shared shape of every annotation tag line.
/// Returns the raw payload and the unconsumed suffix.
pub fn match_tag_line<'a>(line: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let rest = eat_keyword(line.trim_start(), tag)?;
    let (payload, rest) = eat_balanced_parens(rest.trim_start())?;
    Some((payload, rest.trim_start()))
}

/// `namespace a::b {`
pub fn match_namespace(line: &str) -> Option<String> {
    let rest = eat_keyword(line.trim_start(), "namespace")?.trim_start();
    let end = rest
        .find(|c: char| !is_ident_char(c) && c != ':')
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let name = &rest[..end];
    let tail = rest[end..].trim();
    if tail.is_empty() || tail == "{" {
        Some(name.to_string())
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub kind: ComponentKind,
    pub name: String,
    pub base_types: Vec<BaseType>,
}

/// `class [[attrs]] Name : public Base, private Other {`
pub fn match_type_decl(line: &str) -> Option<TypeDecl> {
    let s = line.trim_start();
    let (kind, rest) = if let Some(rest) = eat_keyword(s, "class") {
        (ComponentKind::Class, rest)
    } else if let Some(rest) = eat_keyword(s, "struct") {
        (ComponentKind::Struct, rest)
    } else {
        return None;
    };
    let rest = eat_attr_block(rest.trim_start());
    let (name, rest) = eat_ident(rest)?;
    let rest = rest.trim_start();
    let base_types = match rest.strip_prefix(':') {
        Some(bases) => parse_base_types(bases),
        None => Vec::new(),
    };
    Some(TypeDecl {
        kind,
        name: name.to_string(),
        base_types,
    })
}

/// Splits a base-type list on template-balanced commas; only entries with
/// an explicit access specifier are recorded.
pub fn parse_base_types(raw: &str) -> Vec<BaseType> {
    let mut bases = Vec::new();
    for entry in split_balanced(raw) {
        let entry = entry.trim().trim_end_matches('{').trim();
        let Some((word, rest)) = eat_ident(entry) else {
            continue;
        };
        let Some(access) = Access::parse(word) else {
            continue;
        };
        let name = rest.trim();
        if !name.is_empty() {
            bases.push(BaseType {
                name: name.to_string(),
                access,
            });
        }
    }
    bases
}

/// Splits on commas at zero `<>`/`()` nesting depth, outside literals.
fn split_balanced(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut angle = 0i32;
    let mut paren = 0i32;
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in raw.char_indices() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '<' => angle += 1,
            '>' => angle -= 1,
            '(' => paren += 1,
            ')' => paren -= 1,
            ',' if angle == 0 && paren == 0 => {
                parts.push(&raw[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Net `{`/`}` balance of one line, ignoring braces inside string and
/// character literals.
pub fn brace_delta(line: &str) -> i64 {
    let mut delta = 0i64;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        if let Some(open) = quote {
            if ch == '\\' {
                chars.next();
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

#[derive(Debug, Clone)]
pub struct PropertyDecl {
    pub modifiers: Modifiers,
    pub ty: String,
    pub name: String,
    pub value: Option<String>,
}

/// `static constexpr int Name = 3;` / `float Name;`
pub fn match_property_decl(line: &str) -> Option<PropertyDecl> {
    let (modifiers, rest) = eat_modifiers(line, MEMBER_MODIFIERS);
    let (ty, rest) = eat_type(rest)?;
    let rest = eat_attr_block(rest.trim_start());
    let (name, rest) = eat_ident(rest)?;
    // The name must be followed by a terminator, an initializer, or a body
    // opener; a bare suffix like `Name2` would have been part of the name.
    let trimmed = rest.trim_start();
    let value = if let Some(init) = trimmed.strip_prefix('=') {
        let init = init.trim_start();
        let end = init.rfind(';')?;
        Some(init[..end].trim().to_string())
    } else if trimmed.starts_with(';') || trimmed.starts_with('{') || trimmed.starts_with('(') {
        None
    } else {
        return None;
    };
    Some(PropertyDecl {
        modifiers,
        ty: ty.to_string(),
        name: name.to_string(),
        value,
    })
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub modifiers: Modifiers,
    pub return_type: String,
    pub name: String,
    pub params_raw: String,
    /// Trailing `const` qualifier after the parameter list.
    pub is_const_qualified: bool,
}

/// `static int Name(int a, float b = 1.0) const;`
pub fn match_function_decl(line: &str) -> Option<FunctionDecl> {
    let (modifiers, rest) = eat_modifiers(line, MEMBER_MODIFIERS);
    let (return_type, rest) = eat_type(rest)?;
    let rest = eat_attr_block(rest.trim_start());
    let (name, rest) = eat_ident(rest)?;
    let (params_raw, rest) = eat_balanced_parens(rest.trim_start())?;
    let rest = rest.trim_start();
    let (is_const_qualified, rest) = match eat_keyword(rest, "const") {
        Some(after) => (true, after.trim_start()),
        None => (false, rest),
    };
    if !rest.starts_with(';') {
        return None;
    }
    Some(FunctionDecl {
        modifiers,
        return_type: return_type.to_string(),
        name: name.to_string(),
        params_raw: params_raw.to_string(),
        is_const_qualified,
    })
}

#[derive(Debug, Clone)]
pub struct OperatorDecl {
    pub modifiers: Modifiers,
    pub return_type: String,
    pub spelling: String,
    pub params_raw: String,
    pub is_const_qualified: bool,
}

fn eat_operator_spelling(s: &str) -> Option<(&str, &str)> {
    if let Some(rest) = s.strip_prefix("[]") {
        return Some(("[]", rest));
    }
    let symbolic = |c: char| "+-*/%<>=!&|^~".contains(c);
    let end = s.find(|c: char| !symbolic(c)).unwrap_or(s.len());
    if end > 0 {
        return Some((&s[..end], &s[end..]));
    }
    // Word-form operators such as `operator bool`.
    eat_ident(s)
}

/// `Vec2 operator+(const Vec2& rhs) const;`
pub fn match_operator_decl(line: &str) -> Option<OperatorDecl> {
    let (modifiers, rest) = eat_modifiers(
        line,
        &["virtual", "constexpr", "const", "inline", "extern"],
    );
    let (return_type, rest) = eat_type(rest)?;
    let rest = eat_attr_block(rest.trim_start());
    let rest = eat_keyword(rest, "operator")?.trim_start();
    let (spelling, rest) = eat_operator_spelling(rest)?;
    let (params_raw, rest) = eat_balanced_parens(rest.trim_start())?;
    let rest = rest.trim_start();
    let (is_const_qualified, rest) = match eat_keyword(rest, "const") {
        Some(after) => (true, after.trim_start()),
        None => (false, rest),
    };
    if !rest.starts_with(';') {
        return None;
    }
    Some(OperatorDecl {
        modifiers,
        return_type: return_type.to_string(),
        spelling: spelling.to_string(),
        params_raw: params_raw.to_string(),
        is_const_qualified,
    })
}

#[derive(Debug, Clone)]
pub struct CtorDecl<'a> {
    pub modifiers: Modifiers,
    pub params_raw: String,
    /// Unconsumed suffix: an inline body or initializer list may follow.
    pub rest: &'a str,
}

/// `explicit TypeName(int a) : member(a) {` — scoped to one exact type name.
pub fn match_constructor<'a>(line: &'a str, type_name: &str) -> Option<CtorDecl<'a>> {
    let (mut modifiers, rest) = eat_modifiers(line, CTOR_MODIFIERS);
    let rest = eat_attr_block(rest);
    let rest = eat_keyword(rest, type_name)?;
    let (params_raw, rest) = eat_balanced_parens(rest.trim_start())?;
    let rest = match eat_keyword(rest.trim_start(), "const") {
        Some(after) => {
            modifiers.is_const = true;
            after
        }
        None => rest,
    };
    Some(CtorDecl {
        modifiers,
        params_raw: params_raw.to_string(),
        rest: rest.trim_start(),
    })
}

#[derive(Debug, Clone)]
pub struct DtorDecl<'a> {
    pub modifiers: Modifiers,
    pub rest: &'a str,
}

/// `virtual ~TypeName()` — scoped to one exact type name.
pub fn match_destructor<'a>(line: &'a str, type_name: &str) -> Option<DtorDecl<'a>> {
    let (modifiers, rest) = eat_modifiers(line, DTOR_MODIFIERS);
    let rest = eat_attr_block(rest);
    let rest = rest.strip_prefix('~')?;
    let rest = eat_keyword(rest, type_name)?;
    let (params, rest) = eat_balanced_parens(rest.trim_start())?;
    if !params.trim().is_empty() {
        return None;
    }
    Some(DtorDecl {
        modifiers,
        rest: rest.trim_start(),
    })
}

/// Parses a declaration's parameter list. Each entry may carry a parameter
/// tag (`MPyParam(...)`), a leading `const`, and a default value; `*`/`&`
/// glued to the name migrate onto the type spelling.
pub fn parse_parameters(raw: &str, param_tag: &str) -> Vec<Parameter> {
    let mut parameters = Vec::new();
    for entry in split_balanced(raw) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (attrs, entry) = match match_tag_line(entry, param_tag) {
            Some((payload, rest)) => (parse_attributes(payload), rest),
            None => (Default::default(), entry),
        };
        let (is_const, entry) = match eat_keyword(entry, "const") {
            Some(rest) => (true, rest.trim_start()),
            None => (false, entry),
        };
        let Some((ty, rest)) = eat_type(entry) else {
            continue;
        };
        let mut ty = ty.to_string();
        let mut rest = rest.trim_start();
        while let Some(stripped) = rest.strip_prefix(['*', '&']) {
            ty.push(rest.chars().next().unwrap_or('*'));
            rest = stripped.trim_start();
        }
        let Some((name, rest)) = eat_ident(rest) else {
            continue;
        };
        let mut param = Parameter::new(name, ty);
        param.is_const = is_const;
        param.attrs = attrs;
        let rest = rest.trim_start();
        if let Some(default) = rest.strip_prefix('=') {
            param.default = Some(default.trim().to_string());
        }
        parameters.push(param);
    }
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lines_keep_delimiters() {
        assert_eq!(match_header("#include \"Math.h\""), Some("\"Math.h\"".into()));
        assert_eq!(match_header("  #include <vector>"), Some("<vector>".into()));
        assert_eq!(match_header("#include_next <x>"), None);
    }

    #[test]
    fn tag_line_returns_payload_and_suffix() {
        let (payload, rest) = match_tag_line("MPyClass(TypeOwned) class Vec2 {", "MPyClass").unwrap();
        assert_eq!(payload, "TypeOwned");
        assert_eq!(rest, "class Vec2 {");
        assert!(match_tag_line("MPyClassX(TypeOwned)", "MPyClass").is_none());
    }

    #[test]
    fn type_decl_with_bases() {
        let decl = match_type_decl("class Vec3 : public Vec2, private Pool<Vec3> {").unwrap();
        assert_eq!(decl.kind, ComponentKind::Class);
        assert_eq!(decl.name, "Vec3");
        assert_eq!(decl.base_types.len(), 2);
        assert_eq!(decl.base_types[0].name, "Vec2");
        assert_eq!(decl.base_types[0].access, Access::Public);
        assert_eq!(decl.base_types[1].access, Access::Private);
    }

    #[test]
    fn function_decl_requires_semicolon() {
        let decl = match_function_decl("static float Length(const Vec2& v) const;").unwrap();
        assert!(decl.modifiers.is_static);
        assert!(decl.is_const_qualified);
        assert_eq!(decl.return_type, "float");
        assert_eq!(decl.name, "Length");
        assert!(match_function_decl("float Length(const Vec2& v)").is_none());
    }

    #[test]
    fn property_decl_captures_value() {
        let decl = match_property_decl("static constexpr int MaxSize = 64;").unwrap();
        assert!(decl.modifiers.is_static && decl.modifiers.is_constexpr);
        assert_eq!(decl.value.as_deref(), Some("64"));
        assert_eq!(match_property_decl("float x;").unwrap().value, None);
    }

    #[test]
    fn operator_decl_spellings() {
        let decl = match_operator_decl("Vec2 operator+(const Vec2& rhs) const;").unwrap();
        assert_eq!(decl.spelling, "+");
        let decl = match_operator_decl("float operator[](size_t index) const;").unwrap();
        assert_eq!(decl.spelling, "[]");
        let decl = match_operator_decl("Vec2& operator+=(const Vec2& rhs);").unwrap();
        assert_eq!(decl.spelling, "+=");
    }

    #[test]
    fn constructor_scoped_to_type_name() {
        let ctor = match_constructor("explicit Vec2(float x, float y)", "Vec2").unwrap();
        assert!(ctor.modifiers.is_explicit);
        assert_eq!(ctor.params_raw, "float x, float y");
        assert!(match_constructor("Vec3(float x)", "Vec2").is_none());
    }

    #[test]
    fn parameters_glue_pointer_suffix_onto_type() {
        let params = parse_parameters("const Vec2 &origin, float *out, int n = 3", "MPyParam");
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].ty, "Vec2&");
        assert!(params[0].is_const);
        assert_eq!(params[1].ty, "float*");
        assert_eq!(params[2].default.as_deref(), Some("3"));
    }

    #[test]
    fn quoted_default_values_do_not_split_parameters() {
        let params = parse_parameters("const char* label = \"x, y\", int n = 3", "MPyParam");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].default.as_deref(), Some("\"x, y\""));
        assert_eq!(params[1].name, "n");
    }

    #[test]
    fn brace_delta_skips_literal_braces() {
        assert_eq!(brace_delta("if (x) { s = \"}\"; }"), 0);
        assert_eq!(brace_delta("class A {"), 1);
        assert_eq!(brace_delta("char open = '{';"), 0);
    }

    #[test]
    fn tagged_parameter_carries_attributes() {
        let params = parse_parameters("MPyParam(ParamIsOut) float& result", "MPyParam");
        assert_eq!(params.len(), 1);
        assert!(params[0].attrs.contains_key("ParamIsOut"));
        assert_eq!(params[0].ty, "float&");
    }
}
