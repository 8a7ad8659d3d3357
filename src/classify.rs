//! Cheap pre-filter deciding whether a snippet is worth running.
//!
//! This is a heuristic, not a security boundary: the sandbox enforces
//! isolation no matter what the classifier says. Its job is to skip code that
//! can never produce a chart before any worker is spun up.

use std::sync::LazyLock;

use regex::Regex;

use crate::extract::Snippet;

/// Names that mark a snippet as reaching for host capabilities.
static DISQUALIFYING_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:subprocess|os\.system|os\.popen|socket|__import__|shutil|ctypes|pickle|urllib)\b|\brequests\.",
    )
    .expect("valid token regex")
});

/// String literals and comments, blanked out before scanning for tokens.
static STRINGS_AND_COMMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^'\\\n]|\\.)*'|"(?:[^"\\\n]|\\.)*"|#[^\n]*"#).expect("valid literal regex")
});

static DISQUALIFYING_CALLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:open|eval|exec|compile|input)\s*\(").expect("valid call regex")
});

static PLOTTING_CALLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bplt\s*\.|\.(?:plot|scatter|bar|barh|hist|pie|fill_between)\s*\(|\b(?:plot|scatter|bar|barh|hist|pie)\s*\(")
        .expect("valid plotting regex")
});

/// Classifier verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Run it.
    Accept,
    /// Skip it, with a short reason for the debug log.
    Reject(String),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Decide whether a snippet looks like it draws something.
pub fn classify(snippet: &Snippet) -> Verdict {
    classify_source(&snippet.source)
}

/// Boolean form of [`classify`].
pub fn looks_like_visualization(snippet: &Snippet) -> bool {
    classify(snippet).is_accept()
}

/// Classify raw snippet source.
pub fn classify_source(source: &str) -> Verdict {
    if source.trim().is_empty() {
        return Verdict::Reject("empty snippet".to_string());
    }

    let code = STRINGS_AND_COMMENTS.replace_all(source, "\"\"");

    if let Some(token) = DISQUALIFYING_TOKENS.find(&code) {
        return Verdict::Reject(format!("uses host capability '{}'", token.as_str()));
    }

    if let Some(found) = DISQUALIFYING_CALLS.find(&code) {
        return Verdict::Reject(format!(
            "calls '{}'",
            found.as_str().trim_end_matches(['(', ' ', '\t'])
        ));
    }

    if PLOTTING_CALLS.is_match(source) {
        Verdict::Accept
    } else {
        Verdict::Reject("no plotting calls".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyplot_calls_accepted() {
        assert!(classify_source("plt.plot([1, 2, 3], [4, 5, 6])").is_accept());
        assert!(classify_source("plt .bar(['a'], [1])").is_accept());
    }

    #[test]
    fn test_bare_and_method_calls_accepted() {
        assert!(classify_source("plot([1,2,3])").is_accept());
        assert!(classify_source("ax.scatter(x, y)").is_accept());
        assert!(classify_source("df.plot(x='a', y='b')").is_accept());
        assert!(classify_source("hist(data, bins=5)").is_accept());
    }

    #[test]
    fn test_non_visual_code_rejected() {
        let verdict = classify_source("x = 5\ny = 10\nprint(x + y)");
        assert_eq!(verdict, Verdict::Reject("no plotting calls".to_string()));
    }

    #[test]
    fn test_identifier_containing_plot_name_rejected() {
        assert!(!classify_source("barplot_count = 3\nprint(barplot_count)").is_accept());
    }

    #[test]
    fn test_process_spawn_rejected() {
        let verdict = classify_source("import subprocess\nsubprocess.run(['ls'])\nplt.plot([1])");
        assert!(matches!(verdict, Verdict::Reject(reason) if reason.contains("subprocess")));
    }

    #[test]
    fn test_file_handles_rejected() {
        let verdict = classify_source("f = open('/etc/passwd')\nplt.plot([1])");
        assert!(matches!(verdict, Verdict::Reject(reason) if reason.contains("open")));
    }

    #[test]
    fn test_eval_rejected() {
        assert!(!classify_source("eval('1+1')\nplt.plot([1])").is_accept());
    }

    #[test]
    fn test_capability_names_inside_text_are_harmless() {
        assert!(classify_source("plt.bar(['a', 'b'], [1, 2])\nplt.title('socket sales')").is_accept());
        assert!(classify_source("pickled = [3, 1]  # pickle jars\nplt.plot(pickled)").is_accept());
        assert!(classify_source("websocket_hits = [5, 8]\nplt.plot(websocket_hits)").is_accept());
    }

    #[test]
    fn test_capability_modules_rejected() {
        let verdict = classify_source("import socket\nplt.plot([1])");
        assert_eq!(verdict, Verdict::Reject("uses host capability 'socket'".to_string()));
        assert!(!classify_source("import pickle\nplt.plot([1])").is_accept());
        assert!(!classify_source("data = requests.get(url)\nplt.plot(data)").is_accept());
    }

    #[test]
    fn test_looks_like_visualization() {
        let extractor = crate::extract::SnippetExtractor::new();
        let snippets = extractor.extract(
            "```viz\nplt.pie([1, 2])\n```\n```python\nprint('hi')\n```\n```viz\nimport shutil\nplot([1])\n```",
        );
        let verdicts: Vec<bool> = snippets.iter().map(looks_like_visualization).collect();
        assert_eq!(verdicts, vec![true, false, false]);
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(
            classify_source("  \n "),
            Verdict::Reject("empty snippet".to_string())
        );
    }
}
