//! Integration tests from the host application's perspective.
//!
//! Each module follows one journey through the public API: configuring a
//! pipeline, handing it agent text, and reading back text and attachments.
//! Nothing here needs a network, a display or an external interpreter.
//!
//! Run: `cargo test --test pipeline_integration`

use std::sync::Arc;

use vizbox::render::RenderBackend;
use vizbox::{VizConfig, VizPipeline};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pipeline(config: VizConfig) -> VizPipeline {
    init_tracing();
    VizPipeline::with_backend(config, Arc::new(RenderBackend::new())).expect("valid test config")
}

// ============================================================================
// 1. Configuration Journey
// ============================================================================
mod configuration {
    use std::collections::HashMap;
    use std::time::Duration;

    use vizbox::{ConfigError, FencePolicy, VizConfig, VizPipeline};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let config = VizConfig::from_lookup(lookup(&[
            ("VIZ_EXECUTION_TIMEOUT_SECS", "4"),
            ("VIZ_MAX_ATTACHMENTS", "2"),
            ("VIZ_FENCE_POLICY", "inline"),
        ]))
        .unwrap();
        assert_eq!(config.execution_timeout(), Duration::from_secs(4));
        assert_eq!(config.max_attachments, 2);
        assert_eq!(config.fence_policy, FencePolicy::InlineImage);
        assert!(VizPipeline::new(config).is_ok());
    }

    #[test]
    fn test_garbage_values_are_reported_by_key() {
        let err = VizConfig::from_lookup(lookup(&[("VIZ_MAX_RASTER_WIDTH", "wide")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "VIZ_MAX_RASTER_WIDTH"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_rejects_unusable_config() {
        let config = VizConfig {
            max_raster_width: 10,
            ..VizConfig::for_testing()
        };
        assert!(VizPipeline::new(config).is_err());
    }
}

// ============================================================================
// 2. Plain Responses Journey
// ============================================================================
mod plain_responses {
    use super::*;

    #[tokio::test]
    async fn test_prose_passes_through() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = "Revenue grew 12% quarter over quarter.";
        let processed = pipeline.process(text).await.unwrap();
        assert_eq!(processed.text, text);
        assert!(processed.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_non_visual_code_is_left_alone() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = "Query:\n```sql\nSELECT month, SUM(total) FROM sales GROUP BY month;\n```\n\
                    Math:\n```python\ntotal = sum([1, 2, 3])\nprint(total)\n```";
        let processed = pipeline.process(text).await.unwrap();
        assert_eq!(processed.text, text);
        assert!(processed.attachments.is_empty());
    }
}

// ============================================================================
// 3. Rendering Journey
// ============================================================================
mod rendering {
    use super::*;

    #[tokio::test]
    async fn test_inline_fence_after_prose_renders() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = "here: ```viz\nplot([1,2,3])\n``` done";
        let processed = pipeline.process(text).await.unwrap();

        assert_eq!(processed.text, text);
        assert_eq!(processed.attachments.len(), 1);
        let attachment = &processed.attachments[0];
        assert_eq!(attachment.name, "visualization_1.png");
        assert_eq!(attachment.media_type, "image/png");
        assert_eq!(attachment.encoding, "base64");

        let png = attachment.decode().unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert!(image.width() <= 400);
        assert!(image.height() <= 300);
    }

    #[tokio::test]
    async fn test_common_chart_types_render() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = r#"
```python
import matplotlib.pyplot as plt
import numpy as np

x = np.linspace(0, 10, 50)
plt.plot(x, np.sin(x), 'r--', label='sin')
plt.plot(x, np.cos(x), label='cos')
plt.title('Waves')
plt.legend()
plt.grid(True)
plt.show()
```

```python
fig, ax = plt.subplots(figsize=(8, 4))
ax.barh(['North', 'South', 'East'], [30, 45, 12], color='green')
ax.set_xlabel('Units')
```

```python
np.random.seed(7)
plt.hist(np.random.randn(500), bins=20, alpha=0.7)
```

```python
plt.pie([35, 25, 40], labels=['A', 'B', 'C'], autopct='%1.1f%%')
```

```python
df = pd.DataFrame({'month': ['Jan', 'Feb', 'Mar'], 'sales': [50, 60, 70]})
df.plot(x='month', y='sales', kind='bar')
```
"#;
        let processed = pipeline.process(text).await.unwrap();
        let names: Vec<&str> = processed.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "visualization_1.png",
                "visualization_2.png",
                "visualization_3.png",
                "visualization_4.png",
                "visualization_5.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_identical_snippets_render_identically() {
        let pipeline = pipeline(VizConfig::for_testing());
        let snippet = "```viz\nnp.random.seed(1)\nplt.scatter(np.random.rand(30), np.random.rand(30))\n```";
        let first = pipeline.process(snippet).await.unwrap();
        let second = pipeline.process(snippet).await.unwrap();
        assert_eq!(first.attachments[0].payload, second.attachments[0].payload);
    }

    #[tokio::test]
    async fn test_last_figure_state_wins() {
        let pipeline = pipeline(VizConfig::for_testing());
        let drawn_then_closed = "```viz\nplt.plot([1, 2, 3])\nplt.close()\n```";
        let processed = pipeline.process(drawn_then_closed).await.unwrap();
        assert!(processed.attachments.is_empty());
    }
}

// ============================================================================
// 4. Isolation Journey
// ============================================================================
mod isolation {
    use super::*;

    #[tokio::test]
    async fn test_process_spawning_snippet_produces_nothing() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = "```python\nimport subprocess\nsubprocess.run(['rm', '-rf', '/'])\nplt.plot([1])\n```";
        let processed = pipeline.process(text).await.unwrap();
        assert!(processed.attachments.is_empty());
        assert_eq!(processed.text, text);
    }

    #[tokio::test]
    async fn test_sandbox_holds_without_the_classifier() {
        let pipeline = pipeline(VizConfig::for_testing());
        for body in [
            "__builtins__\nplt.plot([1])",
            "open('/etc/passwd')\nplt.plot([1])",
            "plt.plot([1]).__class__",
            "import os\nplt.plot([1])",
        ] {
            let processed = pipeline.process(&format!("```viz\n{}\n```", body)).await.unwrap();
            assert!(processed.attachments.is_empty(), "{:?} should not render", body);
        }
    }

    #[tokio::test]
    async fn test_failure_then_success_numbers_from_one() {
        let pipeline = pipeline(VizConfig::for_testing());
        let text = "```viz\nplt.plot([1, 2]) + undefined\n```\n```viz\nplt.bar(['a'], [1])\n```";
        let processed = pipeline.process(text).await.unwrap();
        assert_eq!(processed.attachments.len(), 1);
        assert_eq!(processed.attachments[0].name, "visualization_1.png");
    }

    #[tokio::test]
    async fn test_no_bleed_through_between_calls() {
        let pipeline = pipeline(VizConfig::for_testing());
        let first = pipeline
            .process("```viz\ndata = [5, 6, 7]\nplt.plot(data)\nplt.title('first')\n```")
            .await
            .unwrap();
        assert_eq!(first.attachments.len(), 1);

        let second = pipeline.process("```viz\nplt.plot(data)\n```").await.unwrap();
        assert!(second.attachments.is_empty());

        let fresh = pipeline.process("```viz\nplt.plot([5, 6, 7])\n```").await.unwrap();
        assert_ne!(fresh.attachments[0].payload, first.attachments[0].payload);
    }

    #[tokio::test]
    async fn test_earlier_snippet_does_not_change_later_render() {
        const NOISY: &str = "```viz\nnp.random.seed(7)\nnoise = np.random.randn(50)\nplt.figure(figsize=(4, 3))\nplt.hist(noise, bins=5)\nplt.title('first')\nplt.xlim(0, 3)\nplt.grid(True)\n```";
        const PLAIN: &str = "```viz\nvalues = np.random.randn(20)\nplt.plot(values)\nplt.ylabel('value')\n```";

        let pipeline = pipeline(VizConfig::for_testing());
        let alone = pipeline.process(PLAIN).await.unwrap();
        assert_eq!(alone.attachments.len(), 1);

        let after = pipeline.process(&format!("{NOISY}\n{PLAIN}")).await.unwrap();
        assert_eq!(after.attachments.len(), 2);
        assert_eq!(after.attachments[1].payload, alone.attachments[0].payload);

        let shared = VizPipeline::new(VizConfig::for_testing()).unwrap();
        let elsewhere = shared.process(PLAIN).await.unwrap();
        assert_eq!(elsewhere.attachments[0].payload, alone.attachments[0].payload);
    }
}

// ============================================================================
// 5. Runaway Snippet Journey
// ============================================================================
mod runaway_snippets {
    use std::time::{Duration, Instant};

    use super::*;

    #[tokio::test]
    async fn test_infinite_loop_times_out_and_pipeline_continues() {
        let config = VizConfig {
            execution_timeout_ms: 300,
            ..VizConfig::for_testing()
        };
        let pipeline = pipeline(config);
        let text = "```viz\nwhile True:\n    pass\n```\n```viz\nplot([1, 2, 3])\n```";

        let started = Instant::now();
        let processed = pipeline.process(text).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(processed.attachments.len(), 1);
        assert_eq!(processed.attachments[0].name, "visualization_1.png");
        assert_eq!(pipeline.executor().live_workers(), 0);
    }

    #[tokio::test]
    async fn test_huge_allocation_is_refused() {
        let config = VizConfig {
            max_collection_len: 10_000,
            ..VizConfig::for_testing()
        };
        let pipeline = pipeline(config);
        let processed = pipeline
            .process("```viz\nplt.plot(list(range(10000000)))\n```")
            .await
            .unwrap();
        assert!(processed.attachments.is_empty());
    }
}

// ============================================================================
// 6. Fence Policy Journey
// ============================================================================
mod fence_policy {
    use vizbox::FencePolicy;

    use super::*;

    const RESPONSE: &str = "Before\n```viz\nplot([1, 2])\n```\nAfter";

    #[tokio::test]
    async fn test_strip_leaves_prose() {
        let pipeline = pipeline(VizConfig {
            fence_policy: FencePolicy::Strip,
            ..VizConfig::for_testing()
        });
        let processed = pipeline.process(RESPONSE).await.unwrap();
        assert_eq!(processed.text, "Before\nAfter");
    }

    #[tokio::test]
    async fn test_inline_embeds_the_attachment() {
        let pipeline = pipeline(VizConfig {
            fence_policy: FencePolicy::InlineImage,
            ..VizConfig::for_testing()
        });
        let processed = pipeline.process(RESPONSE).await.unwrap();
        let expected = format!("Before\n{}\nAfter", processed.attachments[0].markdown_image());
        assert_eq!(processed.text, expected);
    }
}

// ============================================================================
// 7. Host Integration Journey
// ============================================================================
mod host_integration {
    use std::time::Duration;

    use vizbox::{Error, PipelineError, agent_instructions};

    use super::*;

    #[tokio::test]
    async fn test_response_serializes_for_transport() {
        let pipeline = pipeline(VizConfig::for_testing());
        let processed = pipeline.process("```viz\nbar(['x'], [1])\n```").await.unwrap();
        let json = serde_json::to_value(&processed).unwrap();
        let attachment = &json["attachments"][0];
        assert_eq!(attachment["mediaType"], "image/png");
        assert_eq!(attachment["encoding"], "base64");
        assert_eq!(attachment["name"], "visualization_1.png");
        assert!(attachment["payload"].as_str().unwrap().starts_with("iVBORw0KGgo"));
    }

    #[tokio::test]
    async fn test_instruction_example_renders() {
        let pipeline = pipeline(VizConfig::for_testing());
        let processed = pipeline.process(&agent_instructions()).await.unwrap();
        assert_eq!(processed.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_further_work() {
        let pipeline = pipeline(VizConfig::for_testing());
        pipeline.shutdown(Duration::from_millis(100)).await;
        let err = pipeline.process("```viz\nplot([1])\n```").await.unwrap_err();
        assert!(matches!(err, Error::Pipeline(PipelineError::ShuttingDown)));
    }
}
