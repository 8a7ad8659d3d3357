//! Usage guide for the agents that write snippets.
//!
//! Hosts append this to an agent's system prompt so that the code it emits
//! stays inside what the sandbox understands.

use crate::config::VizConfig;
use crate::extract::{ALIAS_TAGS, PRIMARY_TAG};
use crate::sandbox::ALLOWED_GLOBALS;

const GUIDE: &str = r#"# Visualization Instructions

When a user asks for a chart, graph or other data visualization, answer with a
fenced code block. The block is executed and the picture is attached to your
message as an image.

```viz
x = np.linspace(0, 10, 100)
plt.plot(x, np.sin(x), label='sin')
plt.title('Sine Wave')
plt.xlabel('x')
plt.ylabel('sin(x)')
plt.grid(True)
plt.legend()
```

## Rules

- `plt`, `np` and `pd` are already available. Import lines for them are
  ignored; any other import fails.
- Do not call `plt.show()` or `plt.savefig()`; the final figure is captured
  automatically.
- One image per block. Use separate blocks for separate charts.
- No files, network, subprocesses, `def`, `class`, `lambda` or `try`.
- Put the data inline. Random data from `np.random` is reproducible.

## Chart types

- Line: `plt.plot(x, y, 'r--', label='...')`
- Bar: `plt.bar(categories, values)` and `plt.barh(categories, values)`
- Scatter: `plt.scatter(x, y, c=colors, s=sizes)`
- Histogram: `plt.hist(data, bins=20)`
- Pie: `plt.pie(values, labels=labels, autopct='%1.1f%%')`
- Tables: `pd.DataFrame({'month': [...], 'sales': [...]}).plot(x='month', y='sales', kind='bar')`

## Best practices

- Always include a title and axis labels.
- Add `label=` and `plt.legend()` when several series share an axis.
- Keep charts simple and focused.
"#;

/// The guide for a pipeline running with default settings.
pub fn agent_instructions() -> String {
    agent_instructions_for(&VizConfig::default())
}

/// The guide, with limits taken from `config`.
pub fn agent_instructions_for(config: &VizConfig) -> String {
    let tags = std::iter::once(PRIMARY_TAG)
        .chain(ALIAS_TAGS.iter().copied())
        .map(|tag| format!("`{}`", tag))
        .collect::<Vec<_>>()
        .join(", ");
    let names = ALLOWED_GLOBALS
        .iter()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{GUIDE}\n## Limits\n\n\
         - Accepted fence tags: {tags}.\n\
         - Each block must finish within {secs} seconds.\n\
         - At most {max} images are attached per message.\n\
         - Names available to a block: {names}.\n",
        secs = config.execution_timeout().as_secs_f64(),
        max = config.max_attachments,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_source;
    use crate::extract::SnippetExtractor;

    #[test]
    fn test_guide_mentions_limits() {
        let config = VizConfig {
            execution_timeout_ms: 5_000,
            max_attachments: 3,
            ..VizConfig::default()
        };
        let guide = agent_instructions_for(&config);
        assert!(guide.contains("within 5 seconds"));
        assert!(guide.contains("At most 3 images"));
        assert!(guide.contains("`viz`"));
        assert!(guide.contains("`plt`"));
    }

    #[test]
    fn test_example_block_is_accepted() {
        let extractor = SnippetExtractor::new();
        let snippets = extractor.extract(GUIDE);
        assert_eq!(snippets.len(), 1);
        assert!(classify_source(&snippets[0].source).is_accept());
    }

    #[test]
    fn test_default_guide_is_markdown() {
        let guide = agent_instructions();
        assert!(guide.starts_with("# Visualization Instructions"));
        assert!(guide.contains("## Limits"));
    }
}
