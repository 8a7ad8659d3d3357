//! Configuration for the visualization pipeline.
//!
//! Values come from the environment (optionally seeded from a `.env` file):
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `VIZ_EXECUTION_TIMEOUT_SECS` | 10 | Wall-clock deadline per snippet |
//! | `VIZ_MAX_RASTER_WIDTH` | 1600 | Upper bound on rendered width (px) |
//! | `VIZ_MAX_RASTER_HEIGHT` | 1200 | Upper bound on rendered height (px) |
//! | `VIZ_MAX_ATTACHMENTS` | 8 | Attachments emitted per message |
//! | `VIZ_FENCE_POLICY` | preserve | What happens to fences that rendered |
//! | `VIZ_STEP_BUDGET` | 20000000 | Interpreter steps per snippet |
//! | `VIZ_MAX_COLLECTION_LEN` | 1000000 | Largest list/array/string a snippet may build |
//! | `VIZ_MAX_TOTAL_ELEMENTS` | 10000000 | Elements a snippet may create in total |
//! | `VIZ_SHUTDOWN_GRACE_MS` | 2000 | Grace period for in-flight snippets on shutdown |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the pipeline does with a fence whose snippet produced an attachment.
///
/// The policy is fixed per pipeline. Fences that did not produce an
/// attachment are always left in the text untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FencePolicy {
    /// Return the response text unchanged.
    #[default]
    Preserve,
    /// Remove the rendered fences, leaving prose only.
    Strip,
    /// Replace each rendered fence with a markdown data-URI image.
    InlineImage,
}

impl std::fmt::Display for FencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preserve => write!(f, "preserve"),
            Self::Strip => write!(f, "strip"),
            Self::InlineImage => write!(f, "inline"),
        }
    }
}

impl FromStr for FencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "preserve" | "keep" => Ok(Self::Preserve),
            "strip" | "remove" => Ok(Self::Strip),
            "inline" | "inline_image" | "inlineimage" => Ok(Self::InlineImage),
            other => Err(format!(
                "unknown fence policy '{}' (expected preserve, strip or inline)",
                other
            )),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VizConfig {
    /// Wall-clock deadline for one snippet, in milliseconds.
    pub execution_timeout_ms: u64,
    /// Maximum raster width in pixels.
    pub max_raster_width: u32,
    /// Maximum raster height in pixels.
    pub max_raster_height: u32,
    /// Maximum attachments produced for one message.
    pub max_attachments: usize,
    /// Treatment of rendered fences in the returned text.
    pub fence_policy: FencePolicy,
    /// Interpreter steps a snippet may take before it is stopped.
    pub step_budget: u64,
    /// Largest collection or string a snippet may build.
    pub max_collection_len: usize,
    /// Elements a snippet may create over its whole run.
    pub max_total_elements: u64,
    /// How long shutdown waits for in-flight snippets before interrupting them.
    pub shutdown_grace_ms: u64,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            execution_timeout_ms: 10_000,
            max_raster_width: 1600,
            max_raster_height: 1200,
            max_attachments: 8,
            fence_policy: FencePolicy::Preserve,
            step_budget: 20_000_000,
            max_collection_len: 1_000_000,
            max_total_elements: 10_000_000,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl VizConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults; set but unparsable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, "VIZ_EXECUTION_TIMEOUT_SECS")? {
            config.execution_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(width) = parse_var(&lookup, "VIZ_MAX_RASTER_WIDTH")? {
            config.max_raster_width = width;
        }
        if let Some(height) = parse_var(&lookup, "VIZ_MAX_RASTER_HEIGHT")? {
            config.max_raster_height = height;
        }
        if let Some(max) = parse_var(&lookup, "VIZ_MAX_ATTACHMENTS")? {
            config.max_attachments = max;
        }
        if let Some(policy) = parse_var(&lookup, "VIZ_FENCE_POLICY")? {
            config.fence_policy = policy;
        }
        if let Some(budget) = parse_var(&lookup, "VIZ_STEP_BUDGET")? {
            config.step_budget = budget;
        }
        if let Some(len) = parse_var(&lookup, "VIZ_MAX_COLLECTION_LEN")? {
            config.max_collection_len = len;
        }
        if let Some(total) = parse_var(&lookup, "VIZ_MAX_TOTAL_ELEMENTS")? {
            config.max_total_elements = total;
        }
        if let Some(grace) = parse_var(&lookup, "VIZ_SHUTDOWN_GRACE_MS")? {
            config.shutdown_grace_ms = grace;
        }

        config.validate()?;
        Ok(config)
    }

    /// A small, fast configuration for tests.
    pub fn for_testing() -> Self {
        Self {
            execution_timeout_ms: 2_000,
            max_raster_width: 400,
            max_raster_height: 300,
            ..Self::default()
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution_timeout_ms == 0 {
            return Err(invalid("execution_timeout_ms", "must be greater than zero"));
        }
        if self.max_raster_width < 64 || self.max_raster_height < 64 {
            return Err(invalid(
                "max_raster_width/max_raster_height",
                "raster bounds must be at least 64x64",
            ));
        }
        if self.max_raster_width > 8192 || self.max_raster_height > 8192 {
            return Err(invalid(
                "max_raster_width/max_raster_height",
                "raster bounds must not exceed 8192x8192",
            ));
        }
        if self.step_budget == 0 {
            return Err(invalid("step_budget", "must be greater than zero"));
        }
        if self.max_collection_len == 0 {
            return Err(invalid("max_collection_len", "must be greater than zero"));
        }
        if self.max_total_elements == 0 {
            return Err(invalid("max_total_elements", "must be greater than zero"));
        }
        Ok(())
    }

    /// Per-snippet deadline.
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        _ => Ok(None),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = VizConfig::default();
        assert_eq!(config.execution_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_attachments, 8);
        assert_eq!(config.fence_policy, FencePolicy::Preserve);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = VizConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, VizConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = VizConfig::from_lookup(lookup_from(&[
            ("VIZ_EXECUTION_TIMEOUT_SECS", "3"),
            ("VIZ_MAX_RASTER_WIDTH", "800"),
            ("VIZ_MAX_RASTER_HEIGHT", "600"),
            ("VIZ_MAX_ATTACHMENTS", "2"),
            ("VIZ_FENCE_POLICY", "inline"),
            ("VIZ_STEP_BUDGET", "1000"),
        ]))
        .unwrap();
        assert_eq!(config.execution_timeout(), Duration::from_secs(3));
        assert_eq!(config.max_raster_width, 800);
        assert_eq!(config.max_raster_height, 600);
        assert_eq!(config.max_attachments, 2);
        assert_eq!(config.fence_policy, FencePolicy::InlineImage);
        assert_eq!(config.step_budget, 1000);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = VizConfig::from_lookup(lookup_from(&[("VIZ_MAX_ATTACHMENTS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("VIZ_MAX_ATTACHMENTS"));
    }

    #[test]
    fn test_from_lookup_blank_value_is_unset() {
        let config = VizConfig::from_lookup(lookup_from(&[("VIZ_MAX_ATTACHMENTS", "  ")])).unwrap();
        assert_eq!(config.max_attachments, 8);
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let err =
            VizConfig::from_lookup(lookup_from(&[("VIZ_EXECUTION_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(err.to_string().contains("execution_timeout_ms"));
    }

    #[test]
    fn test_total_element_limit_from_env() {
        let config =
            VizConfig::from_lookup(lookup_from(&[("VIZ_MAX_TOTAL_ELEMENTS", "2500")])).unwrap();
        assert_eq!(config.max_total_elements, 2500);

        let err =
            VizConfig::from_lookup(lookup_from(&[("VIZ_MAX_TOTAL_ELEMENTS", "0")])).unwrap_err();
        assert!(err.to_string().contains("max_total_elements"));
    }

    #[test]
    fn test_tiny_raster_is_invalid() {
        let config = VizConfig {
            max_raster_width: 10,
            ..VizConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fence_policy_from_str_aliases() {
        assert_eq!(FencePolicy::from_str("keep").unwrap(), FencePolicy::Preserve);
        assert_eq!(FencePolicy::from_str("STRIP").unwrap(), FencePolicy::Strip);
        assert_eq!(FencePolicy::from_str("remove").unwrap(), FencePolicy::Strip);
        assert_eq!(FencePolicy::from_str("inline-image").unwrap(), FencePolicy::InlineImage);
        assert_eq!(FencePolicy::from_str("inline").unwrap(), FencePolicy::InlineImage);
        assert!(FencePolicy::from_str("sometimes").is_err());
    }

    #[test]
    fn test_config_deserializes_with_partial_fields() {
        let config: VizConfig =
            serde_json::from_str(r#"{"max_attachments": 3, "fence_policy": "strip"}"#).unwrap();
        assert_eq!(config.max_attachments, 3);
        assert_eq!(config.fence_policy, FencePolicy::Strip);
        assert_eq!(config.execution_timeout_ms, 10_000);
    }
}
