//! Physical-to-logical line splitting.
//!
//! Strips comments, joins bracket continuations and backslash continuations,
//! splits `;`-separated statements and records indentation. The expression
//! parser then only ever sees one logical line at a time.

use super::error::ScriptError;

/// Largest snippet accepted, in bytes.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;
/// Longest logical line accepted, in characters.
pub const MAX_LINE_CHARS: usize = 2_000;
/// Deepest bracket nesting accepted.
pub const MAX_BRACKET_DEPTH: usize = 48;

/// Column width a tab counts for when measuring indentation.
const TAB_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based physical line the logical line starts on.
    pub number: usize,
    pub indent: usize,
    pub text: String,
}

pub fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, ScriptError> {
    if source.len() > MAX_SOURCE_BYTES {
        return Err(ScriptError::limit(format!(
            "snippet is {} bytes, the limit is {}",
            source.len(),
            MAX_SOURCE_BYTES
        )));
    }

    let mut lines = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut continuing = false;
    let mut start = 0usize;
    let mut indent = 0usize;

    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;

        if !continuing {
            let trimmed = raw.trim_start_matches([' ', '\t']);
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            indent = indentation(raw);
            start = number;
        }

        let mut quote: Option<char> = None;
        let mut escaped = false;
        let body = if continuing { raw.trim_start() } else { raw.trim_start_matches([' ', '\t']) };

        for ch in body.chars() {
            if let Some(q) = quote {
                buf.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
                continue;
            }

            match ch {
                '#' => break,
                '\'' | '"' => {
                    quote = Some(ch);
                    buf.push(ch);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    if depth > MAX_BRACKET_DEPTH {
                        return Err(ScriptError::limit("brackets are nested too deeply").at_line(number));
                    }
                    buf.push(ch);
                }
                ')' | ']' | '}' => {
                    if depth == 0 {
                        return Err(ScriptError::syntax(format!("unmatched '{}'", ch)).at_line(number));
                    }
                    depth -= 1;
                    buf.push(ch);
                }
                ';' if depth == 0 => {
                    push_line(&mut lines, &mut buf, start, indent)?;
                }
                _ => buf.push(ch),
            }
        }

        if quote.is_some() {
            return Err(ScriptError::syntax("unterminated string literal").at_line(number));
        }

        let trimmed_len = buf.trim_end().len();
        buf.truncate(trimmed_len);
        if buf.ends_with('\\') {
            buf.pop();
            let kept = buf.trim_end().len();
            buf.truncate(kept);
            buf.push(' ');
            continuing = true;
        } else if depth > 0 {
            buf.push(' ');
            continuing = true;
        } else {
            continuing = false;
            push_line(&mut lines, &mut buf, start, indent)?;
        }
    }

    if continuing || depth > 0 {
        return Err(ScriptError::syntax("unexpected end of snippet").at_line(start));
    }

    Ok(lines)
}

fn push_line(
    lines: &mut Vec<LogicalLine>,
    buf: &mut String,
    number: usize,
    indent: usize,
) -> Result<(), ScriptError> {
    let text = buf.trim().to_string();
    buf.clear();
    if text.is_empty() {
        return Ok(());
    }
    if text.chars().count() > MAX_LINE_CHARS {
        return Err(ScriptError::limit(format!(
            "statement is longer than {} characters",
            MAX_LINE_CHARS
        ))
        .at_line(number));
    }
    lines.push(LogicalLine {
        number,
        indent,
        text,
    });
    Ok(())
}

fn indentation(raw: &str) -> usize {
    raw.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

/// The leading identifier-like word of a logical line.
pub fn leading_word(text: &str) -> &str {
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptErrorKind;

    fn texts(source: &str) -> Vec<(usize, usize, String)> {
        logical_lines(source)
            .unwrap()
            .into_iter()
            .map(|l| (l.number, l.indent, l.text))
            .collect()
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let lines = texts("\n# setup\nx = 1  # trailing\n\n");
        assert_eq!(lines, vec![(3, 0, "x = 1".to_string())]);
    }

    #[test]
    fn test_hash_inside_string_is_not_comment() {
        let lines = texts("plt.plot(x, color='#ff0000')");
        assert_eq!(lines[0].2, "plt.plot(x, color='#ff0000')");
    }

    #[test]
    fn test_bracket_continuation() {
        let lines = texts("data = [\n    1,\n    2,\n]\nplot(data)");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, 1);
        assert_eq!(lines[0].2, "data = [ 1, 2, ]");
        assert_eq!(lines[1].0, 5);
    }

    #[test]
    fn test_backslash_continuation() {
        let lines = texts("x = 1 + \\\n    2");
        assert_eq!(lines, vec![(1, 0, "x = 1 + 2".to_string())]);
    }

    #[test]
    fn test_backslash_continuation_without_space() {
        let lines = texts("total = 1 +\\\n    2 +\\\n 3");
        assert_eq!(lines, vec![(1, 0, "total = 1 + 2 + 3".to_string())]);
    }

    #[test]
    fn test_semicolons_split_statements() {
        let lines = texts("a = 1; b = 2");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].2, "b = 2");
    }

    #[test]
    fn test_indentation_is_measured() {
        let lines = texts("for i in range(3):\n    x = i\n\tplot([x])");
        assert_eq!(lines[1].1, 4);
        assert_eq!(lines[2].1, 4);
    }

    #[test]
    fn test_unterminated_string() {
        let err = logical_lines("title('oops)").unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::SyntaxError);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = logical_lines("plot([1, 2").unwrap_err();
        assert!(err.message.contains("unexpected end"));
    }

    #[test]
    fn test_unmatched_closer() {
        assert!(logical_lines("x = 1)").is_err());
    }

    #[test]
    fn test_deep_nesting_is_a_limit() {
        let source = format!("x = {}1{}", "(".repeat(200), ")".repeat(200));
        let err = logical_lines(&source).unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::LimitExceeded);
    }

    #[test]
    fn test_oversized_source() {
        let source = "x = 1\n".repeat(20_000);
        let err = logical_lines(&source).unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::LimitExceeded);
    }

    #[test]
    fn test_leading_word() {
        assert_eq!(leading_word("for x in y:"), "for");
        assert_eq!(leading_word("if(x):"), "if");
        assert_eq!(leading_word("plt.plot()"), "plt");
    }
}
