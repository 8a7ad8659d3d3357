//! The orchestrator: text in, text plus attachments out.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attachment::{Attachment, encode_attachment};
use crate::classify::{Verdict, classify};
use crate::config::{FencePolicy, VizConfig};
use crate::error::{PipelineError, Result, SnippetIssue};
use crate::extract::SnippetExtractor;
use crate::render::RenderBackend;
use crate::sandbox::SandboxExecutor;

/// A response after its visualization snippets have been run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedResponse {
    /// Response text, rewritten according to the pipeline's [`FencePolicy`].
    pub text: String,
    /// One attachment per successful snippet, in source order.
    pub attachments: Vec<Attachment>,
}

/// Runs every visualization snippet in a response and collects the images.
///
/// Snippets run one at a time in source order. A snippet that is rejected,
/// times out, raises or draws nothing is logged and skipped; the only errors
/// returned are infrastructure failures.
#[derive(Debug)]
pub struct VizPipeline {
    config: VizConfig,
    extractor: SnippetExtractor,
    executor: SandboxExecutor,
}

impl VizPipeline {
    /// Create a pipeline rendering through the process-wide backend.
    pub fn new(config: VizConfig) -> Result<Self> {
        Self::with_backend(config, RenderBackend::shared())
    }

    /// Create a pipeline with its own render backend.
    pub fn with_backend(config: VizConfig, backend: Arc<RenderBackend>) -> Result<Self> {
        config.validate()?;
        let executor = SandboxExecutor::with_backend(&config, backend);
        tracing::debug!(
            timeout_ms = config.execution_timeout_ms,
            max_attachments = config.max_attachments,
            fence_policy = %config.fence_policy,
            "Visualization pipeline ready"
        );
        Ok(Self {
            config,
            extractor: SnippetExtractor::new(),
            executor,
        })
    }

    pub fn config(&self) -> &VizConfig {
        &self.config
    }

    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    /// Run the snippets in `text` and attach what they draw.
    pub async fn process(&self, text: &str) -> Result<ProcessedResponse> {
        if self.executor.is_shutting_down() {
            return Err(PipelineError::ShuttingDown.into());
        }

        let snippets = self.extractor.extract(text);
        let mut attachments = Vec::new();
        let mut rendered: Vec<Range<usize>> = Vec::new();

        for snippet in &snippets {
            if attachments.len() >= self.config.max_attachments {
                tracing::debug!(
                    skipped = snippets.len() - snippet.ordinal,
                    max_attachments = self.config.max_attachments,
                    "Attachment limit reached"
                );
                break;
            }

            if let Verdict::Reject(reason) = classify(snippet) {
                SnippetIssue::ClassificationRejected { reason }.report(snippet.ordinal);
                continue;
            }

            let result = self.executor.execute(snippet).await?;
            let Some(raster) = result.raster_bytes.as_deref() else {
                if let Some(issue) = result.issue() {
                    issue.report(snippet.ordinal);
                }
                continue;
            };

            match encode_attachment(raster, attachments.len() + 1) {
                Ok(attachment) => {
                    tracing::debug!(
                        snippet = snippet.ordinal,
                        name = %attachment.name,
                        elapsed_ms = result.duration_ms,
                        "Rendered visualization"
                    );
                    rendered.push(snippet.source_span.clone());
                    attachments.push(attachment);
                }
                Err(e) => SnippetIssue::EncodingFailure {
                    summary: e.to_string(),
                }
                .report(snippet.ordinal),
            }
        }

        if !snippets.is_empty() {
            tracing::info!(
                snippets = snippets.len(),
                attachments = attachments.len(),
                "Processed visualization snippets"
            );
        }

        let text = rewrite_fences(text, &rendered, &attachments, self.config.fence_policy);
        Ok(ProcessedResponse { text, attachments })
    }

    /// Refuse new work, wait up to `grace` for in-flight snippets, then
    /// interrupt them.
    pub async fn shutdown(&self, grace: Duration) {
        self.executor.shutdown(grace).await;
    }
}

/// Apply `policy` to the fences that produced attachments.
///
/// `spans[i]` is the fence that produced `attachments[i]`; spans are in
/// ascending, non-overlapping order.
fn rewrite_fences(
    text: &str,
    spans: &[Range<usize>],
    attachments: &[Attachment],
    policy: FencePolicy,
) -> String {
    if policy == FencePolicy::Preserve || spans.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (span, attachment) in spans.iter().zip(attachments) {
        out.push_str(&text[cursor..span.start]);
        cursor = span.end;
        match policy {
            FencePolicy::InlineImage => out.push_str(&attachment.markdown_image()),
            FencePolicy::Strip => {
                // Take the fence's line break with it.
                if text[cursor..].starts_with("\r\n") {
                    cursor += 2;
                } else if text[cursor..].starts_with('\n') {
                    cursor += 1;
                }
            }
            FencePolicy::Preserve => {}
        }
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pipeline(config: VizConfig) -> VizPipeline {
        VizPipeline::with_backend(config, Arc::new(RenderBackend::new())).unwrap()
    }

    #[tokio::test]
    async fn test_text_without_fences_is_untouched() {
        let pipeline = pipeline(VizConfig::for_testing());
        let processed = pipeline.process("The answer is 42.").await.unwrap();
        assert_eq!(processed.text, "The answer is 42.");
        assert!(processed.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_names_count_successes_only() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = "\
```viz
plt.plot([1, 2, 3])
```
```viz
plt.plot(undefined_series)
```
```viz
plt.bar(['a', 'b'], [3, 4])
```";
        let processed = pipeline.process(text).await.unwrap();
        let names: Vec<&str> = processed.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["visualization_1.png", "visualization_2.png"]);
        assert_eq!(processed.text, text);
    }

    #[tokio::test]
    async fn test_rejected_snippets_never_run() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = "```python\nprint('hello')\n```\n```python\nimport subprocess\nplt.plot([1])\n```";
        let processed = pipeline.process(text).await.unwrap();
        assert!(processed.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_stops_at_max_attachments() {
        let config = VizConfig {
            max_attachments: 1,
            ..VizConfig::for_testing()
        };
        let pipeline = pipeline(config);
        let text = "```viz\nplot([1, 2])\n```\n```viz\nplot([3, 4])\n```";
        let processed = pipeline.process(text).await.unwrap();
        assert_eq!(processed.attachments.len(), 1);
        assert_eq!(processed.attachments[0].name, "visualization_1.png");
    }

    #[tokio::test]
    async fn test_strip_policy_removes_rendered_fences_only() {
        let config = VizConfig {
            fence_policy: FencePolicy::Strip,
            ..VizConfig::for_testing()
        };
        let pipeline = pipeline(config);
        let text = "Intro\n```viz\nplot([1, 2])\n```\nMiddle\n```viz\nplot(missing)\n```\nEnd";
        let processed = pipeline.process(text).await.unwrap();
        assert_eq!(processed.attachments.len(), 1);
        assert_eq!(processed.text, "Intro\nMiddle\n```viz\nplot(missing)\n```\nEnd");
    }

    #[tokio::test]
    async fn test_inline_policy_embeds_data_uri() {
        let config = VizConfig {
            fence_policy: FencePolicy::InlineImage,
            ..VizConfig::for_testing()
        };
        let pipeline = pipeline(config);
        let processed = pipeline
            .process("Chart:\n```viz\nplt.pie([1, 2, 3])\n```\nDone")
            .await
            .unwrap();
        assert_eq!(processed.attachments.len(), 1);
        assert!(processed.text.starts_with("Chart:\n![visualization_1](data:image/png;base64,"));
        assert!(processed.text.ends_with(")\nDone"));
        assert!(!processed.text.contains("```"));
    }

    #[tokio::test]
    async fn test_process_after_shutdown_fails() {
        let pipeline = pipeline(VizConfig::for_testing());
        pipeline.shutdown(Duration::from_millis(10)).await;
        let err = pipeline.process("```viz\nplot([1])\n```").await.unwrap_err();
        assert!(matches!(err, crate::Error::Pipeline(PipelineError::ShuttingDown)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = VizConfig {
            execution_timeout_ms: 0,
            ..VizConfig::for_testing()
        };
        assert!(VizPipeline::new(config).is_err());
    }

    #[test]
    fn test_rewrite_fences_preserve_is_identity() {
        let text = "a\n```viz\nplot([1])\n```\nb";
        let attachment = encode_attachment(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], 1).unwrap();
        let span = 2..text.len() - 2;
        assert_eq!(
            rewrite_fences(text, &[span.clone()], &[attachment.clone()], FencePolicy::Preserve),
            text
        );
        assert_eq!(
            rewrite_fences(text, &[span], &[attachment], FencePolicy::Strip),
            "a\nb"
        );
    }

    #[test]
    fn test_processed_response_serializes() {
        let response = ProcessedResponse {
            text: "hi".to_string(),
            attachments: Vec::new(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"text":"hi","attachments":[]}"#);
    }
}
