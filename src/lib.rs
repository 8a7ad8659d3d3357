//! Sandboxed execution of agent-authored visualization snippets.
//!
//! Agents answer data questions with fenced code blocks that draw charts.
//! This crate finds those blocks, runs each one in an isolated interpreter
//! that only knows an explicit allow-list of plotting, numeric and tabular
//! names, rasterizes whatever the snippet drew into a PNG, and hands the
//! image back as a base64 attachment.
//!
//! ```text
//! response text ─▶ extract ─▶ classify ─▶ sandbox ─▶ render ─▶ attachment
//!                  (fences)   (heuristic)  (worker,   (PNG)     (base64)
//!                                          deadline)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use vizbox::{VizConfig, VizPipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = VizPipeline::new(VizConfig::from_env()?)?;
//! let processed = pipeline
//!     .process("Sales by month:\n```viz\nplt.bar(['Jan', 'Feb'], [50, 60])\n```")
//!     .await?;
//!
//! for attachment in &processed.attachments {
//!     println!("{} ({} base64 chars)", attachment.name, attachment.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod attachment;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod instructions;
pub mod pipeline;
pub mod render;
pub mod sandbox;
pub mod script;

pub use attachment::{Attachment, encode_attachment};
pub use classify::{Verdict, classify};
pub use config::{FencePolicy, VizConfig};
pub use error::{ConfigError, Error, PipelineError, Result, SnippetIssue};
pub use extract::{Snippet, SnippetExtractor};
pub use instructions::{agent_instructions, agent_instructions_for};
pub use pipeline::{ProcessedResponse, VizPipeline};
pub use sandbox::{ExecutionOutcome, ExecutionResult, SandboxExecutor, SandboxState};
