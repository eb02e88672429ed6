//! Lexical pre-filter run before line matching. Strips `//` and `/* */`
//! comments (tracking block-comment state across lines) while leaving
//! string and character literals intact, so quoted attribute payloads
//! reach the attribute grammar unchanged. Line structure is preserved:
//! the output has exactly as many lines as the input, keeping diagnostic
//! line numbers real. Structural characters inside literals are the line
//! matchers' concern; each of them walks quote state itself.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    BlockComment,
    StringLit,
    CharLit,
}

/// Filters one source unit. Block-comment state carries across lines;
/// string and character literals do not (an unterminated literal is closed
/// at end of line, matching how the declaration grammar is line-oriented).
pub fn filter_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;

    for (line_idx, line) in source.split('\n').enumerate() {
        if line_idx > 0 {
            out.push('\n');
        }
        if matches!(state, State::StringLit | State::CharLit) {
            state = State::Code;
        }
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0usize;
        while i < chars.len() {
            let ch = chars[i];
            let next = chars.get(i + 1).copied();
            match state {
                State::Code => match ch {
                    '/' if next == Some('/') => break,
                    '/' if next == Some('*') => {
                        state = State::BlockComment;
                        out.push(' ');
                        out.push(' ');
                        i += 2;
                        continue;
                    }
                    '"' => {
                        state = State::StringLit;
                        out.push(ch);
                    }
                    '\'' => {
                        state = State::CharLit;
                        out.push(ch);
                    }
                    _ => out.push(ch),
                },
                State::BlockComment => {
                    if ch == '*' && next == Some('/') {
                        state = State::Code;
                        out.push(' ');
                        out.push(' ');
                        i += 2;
                        continue;
                    }
                    out.push(' ');
                }
                State::StringLit => {
                    out.push(ch);
                    if ch == '\\' {
                        if let Some(escaped) = next {
                            out.push(escaped);
                            i += 2;
                            continue;
                        }
                    } else if ch == '"' {
                        state = State::Code;
                    }
                }
                State::CharLit => {
                    out.push(ch);
                    if ch == '\\' {
                        if let Some(escaped) = next {
                            out.push(escaped);
                            i += 2;
                            continue;
                        }
                    } else if ch == '\'' {
                        state = State::Code;
                    }
                }
            }
            i += 1;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comments() {
        assert_eq!(filter_source("int x; // brace {"), "int x; ");
    }

    #[test]
    fn block_comment_spans_lines_and_preserves_line_count() {
        let src = "a /* open\nstill { } comment\nclose */ b";
        let out = filter_source(src);
        assert_eq!(out.lines().count(), 3);
        assert!(!out.contains('{'));
        assert!(out.lines().last().unwrap().contains('b'));
    }

    #[test]
    fn string_literals_pass_through_verbatim() {
        let out = filter_source("auto s = \"{ not, a; brace }\"; // trailing {");
        assert!(out.contains("\"{ not, a; brace }\";"));
        assert!(!out.contains("trailing"));
    }

    #[test]
    fn comment_markers_inside_literals_are_not_comments() {
        let out = filter_source("auto url = \"http://host/*x*/\"; int y;");
        assert!(out.contains("\"http://host/*x*/\""));
        assert!(out.contains("int y;"));
    }

    #[test]
    fn include_paths_survive() {
        let out = filter_source("#include \"Engine/Math.h\"");
        assert!(out.contains("Engine/Math.h"));
    }
}
