//! Attribute grammar reader: parses the comma-separated payload of a tag
//! (`MPyClass(TypeOwned, Name="vec")`) into the [`Attribute`] variants.

use crate::model::{Attribute, AttributeMap};

/// Parses an attribute-list string into a name-keyed map. Entries are
/// separated by top-level commas (commas inside nested parentheses do not
/// split). `name(payload)` yields a Group parsed recursively, `name=value`
/// a KeyValue with one layer of surrounding quotes stripped, any other
/// non-empty entry a Flag. Terminates on unbalanced input.
pub fn parse_attributes(input: &str) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    for entry in split_top_level(input) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let open = entry.find('(');
        let assign = entry.find('=');
        // Whichever of `=` and `(` appears first decides the shape, so a
        // quoted value may itself contain parentheses.
        if let Some(open) = open.filter(|&open| assign.map_or(true, |assign| open < assign)) {
            let name = entry[..open].trim();
            let payload = entry[open + 1..].trim_end();
            let payload = payload.strip_suffix(')').unwrap_or(payload);
            if !name.is_empty() {
                attrs.insert(name.to_string(), Attribute::Group(parse_attributes(payload)));
            }
            continue;
        }
        if let Some((name, value)) = entry.split_once('=') {
            let name = name.trim();
            let value = strip_quotes(value.trim());
            if !name.is_empty() {
                attrs.insert(name.to_string(), Attribute::KeyValue(value.to_string()));
            }
            continue;
        }
        attrs.insert(entry.to_string(), Attribute::Flag);
    }
    attrs
}

/// Splits on commas not enclosed in parentheses or quotes. Unbalanced
/// closers are clamped at depth zero so malformed input still terminates.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in input.char_indices() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
