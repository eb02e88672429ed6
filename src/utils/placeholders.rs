//! `${name}` template expansion used by the config variable layer and the
//! code templates. Two modifiers are understood, spelled
//! `${name:keep_indent,empty_no_line}`:
//!
//! - `keep_indent` re-indents continuation lines of a multi-line value to
//!   the placeholder's starting column.
//! - `empty_no_line` drops the whole template line when the value is empty
//!   and nothing else remains on it.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("placeholder ${{{name}}} not found")]
    Unknown { name: String },
    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },
}

#[derive(Debug, Clone, Copy, Default)]
struct Modifiers {
    keep_indent: bool,
    empty_no_line: bool,
}

fn parse_modifiers(spec: &str) -> Modifiers {
    let mut mods = Modifiers::default();
    for word in spec.split(',') {
        match word.trim() {
            "keep_indent" => mods.keep_indent = true,
            "empty_no_line" => mods.empty_no_line = true,
            _ => {}
        }
    }
    mods
}

/// Expands every `${...}` placeholder in `template` from `vars`. With
/// `check` set an unknown placeholder is an error; otherwise it is kept
/// verbatim in the output.
pub fn apply_placeholders(
    template: &str,
    check: bool,
    vars: &[(&str, &str)],
) -> Result<String, PlaceholderError> {
    let mut out = String::with_capacity(template.len());

    for (line_idx, line) in template.split('\n').enumerate() {
        if line_idx > 0 {
            out.push('\n');
        }
        let expanded = expand_line(line, check, vars)?;
        match expanded {
            Some(text) => out.push_str(&text),
            // Line suppressed by empty_no_line: drop it together with the
            // newline that introduced it.
            None => {
                if out.ends_with('\n') {
                    out.pop();
                }
            }
        }
    }

    Ok(out)
}

fn expand_line(
    line: &str,
    check: bool,
    vars: &[(&str, &str)],
) -> Result<Option<String>, PlaceholderError> {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    let mut suppress_if_blank = false;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(PlaceholderError::Unterminated { offset: start });
        };
        let body = &after[..end];
        let (name, mods) = match body.split_once(':') {
            Some((name, spec)) => (name.trim(), parse_modifiers(spec)),
            None => (body.trim(), Modifiers::default()),
        };

        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => {
                if value.is_empty() && mods.empty_no_line {
                    suppress_if_blank = true;
                } else if mods.keep_indent {
                    let column = out.len() - out.rfind('\n').map_or(0, |i| i + 1);
                    let indent = " ".repeat(column);
                    let mut first = true;
                    for value_line in value.split('\n') {
                        if !first {
                            out.push('\n');
                            out.push_str(&indent);
                        }
                        out.push_str(value_line);
                        first = false;
                    }
                } else {
                    out.push_str(value);
                }
            }
            None if check => {
                return Err(PlaceholderError::Unknown {
                    name: name.to_string(),
                })
            }
            None => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    if suppress_if_blank && out.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(out))
}
