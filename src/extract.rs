//! Fenced snippet extraction.
//!
//! Scans agent text for fenced blocks tagged as visualization scripts. The
//! closing delimiter of a block is the first "```" after its opening fence,
//! so two adjacent blocks are never swallowed as one. Blocks with other tags
//! are consumed too, otherwise their closing fence could be mistaken for the
//! opening of a visualization block.

use std::ops::Range;

use regex::Regex;

use crate::error::SnippetIssue;

/// Primary fence tag for visualization snippets.
pub const PRIMARY_TAG: &str = "viz";

/// Alias tags accepted in addition to [`PRIMARY_TAG`].
pub const ALIAS_TAGS: &[&str] = &[
    "python",
    "py",
    "python3",
    "python-viz",
    "pyviz",
    "matplotlib",
];

const FENCE: &str = "```";

/// One fenced block of agent-supplied code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// Fence body exactly as it appeared.
    pub raw_text: String,
    /// Body with pre-provided imports removed; this is what gets executed.
    pub source: String,
    /// The fence tag, lowercased.
    pub language_tag: String,
    /// 0-based position among visualization fences in the text.
    pub ordinal: usize,
    /// Byte range of the whole fence, delimiters included.
    pub source_span: Range<usize>,
}

/// Finds visualization snippets in response text.
#[derive(Debug)]
pub struct SnippetExtractor {
    opening: Regex,
    preloaded_import: Regex,
}

impl SnippetExtractor {
    /// Create an extractor recognizing [`PRIMARY_TAG`] and [`ALIAS_TAGS`].
    pub fn new() -> Self {
        Self {
            opening: Regex::new(r"```([A-Za-z0-9_+.\-]*)[ \t]*\r?\n").expect("valid fence regex"),
            preloaded_import: Regex::new(
                r"^\s*(?:import\s+(?:matplotlib\.pyplot\s+as\s+plt|matplotlib\.pyplot|matplotlib|numpy\s+as\s+np|numpy|pandas\s+as\s+pd|pandas)|from\s+matplotlib\s+import\s+pyplot\s+as\s+plt|%matplotlib\b.*)\s*(?:#.*)?$",
            )
            .expect("valid import regex"),
        }
    }

    /// Whether a fence tag marks a visualization snippet.
    pub fn is_recognized_tag(tag: &str) -> bool {
        tag.eq_ignore_ascii_case(PRIMARY_TAG) || ALIAS_TAGS.iter().any(|a| tag.eq_ignore_ascii_case(a))
    }

    /// Extract every visualization snippet, in source order.
    ///
    /// Never fails: malformed fences are skipped and logged at debug level.
    pub fn extract(&self, text: &str) -> Vec<Snippet> {
        let mut snippets = Vec::new();
        let mut cursor = 0;

        while cursor < text.len() {
            let Some(caps) = self.opening.captures(&text[cursor..]) else {
                break;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };
            let open_start = cursor + whole.start();
            let body_start = cursor + whole.end();
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

            let Some(close_rel) = text[body_start..].find(FENCE) else {
                SnippetIssue::ExtractionAmbiguous { offset: open_start }.report(snippets.len());
                break;
            };
            let close = body_start + close_rel;

            // A "closing" fence that carries its own tag is really the next
            // block's opener: this block was never terminated.
            if self.opens_tagged_block(&text[close..]) {
                SnippetIssue::ExtractionAmbiguous { offset: open_start }.report(snippets.len());
                cursor = close;
                continue;
            }

            let span = open_start..close + FENCE.len();
            cursor = span.end;

            if !Self::is_recognized_tag(tag) {
                continue;
            }

            let raw_text = trim_trailing_newline(&text[body_start..close]).to_string();
            let source = self.strip_preloaded_imports(&raw_text);
            snippets.push(Snippet {
                raw_text,
                source,
                language_tag: tag.to_ascii_lowercase(),
                ordinal: snippets.len(),
                source_span: span,
            });
        }

        snippets
    }

    /// Remove import lines for the names the sandbox already provides.
    ///
    /// Other imports are left alone; the sandbox rejects them when run.
    pub fn strip_preloaded_imports(&self, code: &str) -> String {
        code.lines()
            .filter(|line| !self.preloaded_import.is_match(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn opens_tagged_block(&self, rest: &str) -> bool {
        self.opening
            .captures(rest)
            .and_then(|caps| {
                let whole = caps.get(0)?;
                let tag = caps.get(1)?;
                Some(whole.start() == 0 && !tag.as_str().is_empty())
            })
            .unwrap_or(false)
    }
}

impl Default for SnippetExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_newline(body: &str) -> &str {
    body.strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_no_fences() {
        let extractor = SnippetExtractor::new();
        assert!(extractor.extract("just prose, nothing to run").is_empty());
        assert!(extractor.extract("").is_empty());
    }

    #[test]
    fn test_inline_fence_after_prose() {
        let extractor = SnippetExtractor::new();
        let text = "here: ```viz\nplot([1,2,3])\n``` done";
        let snippets = extractor.extract(text);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].raw_text, "plot([1,2,3])");
        assert_eq!(snippets[0].language_tag, "viz");
        assert_eq!(snippets[0].ordinal, 0);
        assert_eq!(&text[snippets[0].source_span.clone()], "```viz\nplot([1,2,3])\n```");
    }

    #[test]
    fn test_two_blocks_are_not_merged() {
        let extractor = SnippetExtractor::new();
        let text = "a\n```python\nplt.plot([1])\n```\nmiddle\n```python\nplt.bar(['x'], [2])\n```\nend";
        let snippets = extractor.extract(text);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].raw_text, "plt.plot([1])");
        assert_eq!(snippets[1].raw_text, "plt.bar(['x'], [2])");
        assert_eq!(snippets[1].ordinal, 1);
        assert!(snippets[0].source_span.end <= snippets[1].source_span.start);
    }

    #[test]
    fn test_other_languages_are_skipped_but_consumed() {
        let extractor = SnippetExtractor::new();
        let text = "```sql\nSELECT 1;\n```\n```viz\nplot([1, 2])\n```";
        let snippets = extractor.extract(text);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].raw_text, "plot([1, 2])");
        assert_eq!(snippets[0].ordinal, 0);
    }

    #[test]
    fn test_alias_tags_case_insensitive() {
        let extractor = SnippetExtractor::new();
        let text = "```Python3\nplt.plot([1])\n```\n```PY\nplt.plot([2])\n```";
        let snippets = extractor.extract(text);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].language_tag, "python3");
        assert_eq!(snippets[1].language_tag, "py");
    }

    #[test]
    fn test_unterminated_fence_is_skipped() {
        let extractor = SnippetExtractor::new();
        let snippets = extractor.extract("```viz\nplot([1, 2])\nno closing fence");
        assert!(snippets.is_empty());
    }

    #[test]
    fn test_interleaved_fence_skips_only_broken_block() {
        let extractor = SnippetExtractor::new();
        // First block never closes; its would-be closer opens the second block.
        let text = "```viz\nplot([1])\n```viz\nplot([2])\n```";
        let snippets = extractor.extract(text);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].raw_text, "plot([2])");
    }

    #[test]
    fn test_untagged_fence_is_not_a_snippet() {
        let extractor = SnippetExtractor::new();
        assert!(extractor.extract("```\nplot([1])\n```").is_empty());
    }

    #[test]
    fn test_strips_preloaded_imports() {
        let extractor = SnippetExtractor::new();
        let code = "import matplotlib.pyplot as plt\nimport numpy as np\nfrom matplotlib import pyplot as plt\nimport pandas as pd  # tables\nx = np.linspace(0, 1, 5)\nplt.plot(x, x)";
        assert_eq!(
            extractor.strip_preloaded_imports(code),
            "x = np.linspace(0, 1, 5)\nplt.plot(x, x)"
        );
    }

    #[test]
    fn test_keeps_foreign_imports() {
        let extractor = SnippetExtractor::new();
        let code = "import os\nimport subprocess\nplt.plot([1])";
        assert_eq!(extractor.strip_preloaded_imports(code), code);
    }

    #[test]
    fn test_snippet_source_has_imports_removed() {
        let extractor = SnippetExtractor::new();
        let snippets = extractor.extract("```python\nimport matplotlib.pyplot as plt\nplt.plot([1, 2])\n```");
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].source, "plt.plot([1, 2])");
        assert!(snippets[0].raw_text.starts_with("import matplotlib"));
    }

    #[test]
    fn test_crlf_bodies() {
        let extractor = SnippetExtractor::new();
        let snippets = extractor.extract("```viz\r\nplot([1])\r\n```");
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].raw_text, "plot([1])");
    }
}
