//! Strongly-typed configuration for the interaction core.
//!
//! Every numeric threshold and distribution parameter the discovery cascade
//! and the behavior models consume lives here rather than in code, so the
//! cascade's behavior is tunable without code changes.  Values can be
//! constructed from defaults, loaded from environment variables (with
//! optional `.env` support), or built programmatically.

use std::env;
use std::num::{ParseFloatError, ParseIntError};

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locator::SemanticRole;

/// Verbosity level for core logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Verbosity {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

/// Minimum confidence each scoring strategy must clear, plus the confidence
/// tiers assigned to content matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyThresholds {
    pub smart_attribute_min: f64,
    pub content_min: f64,
    /// Heuristic role detection clears a higher bar; it is the least
    /// reliable strategy in the cascade.
    pub heuristic_min: f64,
    pub content_exact: f64,
    pub content_substring: f64,
    pub content_fuzzy: f64,
    /// Minimum token overlap for the fuzzy content tier to count at all.
    pub fuzzy_min_overlap: f64,
}

impl Default for StrategyThresholds {
    fn default() -> Self {
        Self {
            smart_attribute_min: 0.5,
            content_min: 0.5,
            heuristic_min: 0.6,
            content_exact: 0.95,
            content_substring: 0.8,
            content_fuzzy: 0.6,
            fuzzy_min_overlap: 0.5,
        }
    }
}

/// One delay distribution: a truncated normal in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayDistribution {
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayDistribution {
    pub fn new(mean_ms: f64, std_dev_ms: f64, min_ms: u64, max_ms: u64) -> Self {
        Self {
            mean_ms,
            std_dev_ms,
            min_ms,
            max_ms,
        }
    }
}

/// Per-kind delay distributions consumed by the timing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub pre_click: DelayDistribution,
    pub post_click: DelayDistribution,
    pub pre_type: DelayDistribution,
    pub scroll_pause: DelayDistribution,
    pub thinking_pause: DelayDistribution,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pre_click: DelayDistribution::new(200.0, 60.0, 100, 300),
            post_click: DelayDistribution::new(200.0, 60.0, 100, 300),
            pre_type: DelayDistribution::new(160.0, 50.0, 80, 250),
            scroll_pause: DelayDistribution::new(100.0, 30.0, 50, 150),
            thinking_pause: DelayDistribution::new(3500.0, 900.0, 2000, 5000),
        }
    }
}

/// Pointer-path generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub control_points_min: u32,
    pub control_points_max: u32,
    /// Maximum perpendicular control-point offset as a fraction of the
    /// straight-line distance.
    pub deviation_ratio: f64,
    pub jitter_px: f64,
    /// Hard bound: no waypoint leaves the start/end bounding box by more
    /// than this many pixels.
    pub max_overshoot_px: f64,
    pub min_waypoints: usize,
    pub max_waypoints: usize,
    pub px_per_waypoint: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub step_variation: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            control_points_min: 1,
            control_points_max: 3,
            deviation_ratio: 0.15,
            jitter_px: 2.0,
            max_overshoot_px: 24.0,
            min_waypoints: 8,
            max_waypoints: 48,
            px_per_waypoint: 16.0,
            min_duration_ms: 300,
            max_duration_ms: 700,
            step_variation: 0.3,
        }
    }
}

/// Typing-schedule generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    pub base_delay_ms: f64,
    pub space_multiplier: f64,
    pub punctuation_multiplier: f64,
    pub variation_min: f64,
    pub variation_max: f64,
    /// Fractional mean growth over the course of a long string.
    pub fatigue_growth: f64,
    /// Chance of a think-pause at a word boundary.
    pub think_pause_probability: f64,
    pub think_pause_min_ms: u64,
    pub think_pause_max_ms: u64,
    pub min_char_delay_ms: u64,
    pub max_char_delay_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 120.0,
            space_multiplier: 1.2,
            punctuation_multiplier: 1.4,
            variation_min: 0.8,
            variation_max: 1.3,
            fatigue_growth: 0.25,
            think_pause_probability: 0.12,
            think_pause_min_ms: 300,
            think_pause_max_ms: 800,
            min_char_delay_ms: 40,
            max_char_delay_ms: 400,
        }
    }
}

/// Signal weights and bounds for heuristic role scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticWeights {
    pub tag: f64,
    pub size: f64,
    pub keyword: f64,
    pub position: f64,
    /// Elements smaller than this area are penalized as implausible targets.
    pub min_area_px: f64,
    pub max_area_px: f64,
    /// Vertical band from the top of the viewport that biases navigation.
    pub nav_band_px: f64,
}

impl Default for SemanticWeights {
    fn default() -> Self {
        Self {
            tag: 0.4,
            size: 0.2,
            keyword: 0.25,
            position: 0.15,
            min_area_px: 64.0,
            max_area_px: 500_000.0,
            nav_band_px: 200.0,
        }
    }
}

/// One row of the role → attribute-pattern table used by the
/// smart-attribute strategy.  A `keyword` of `None` scores on attribute
/// presence alone; otherwise the attribute value must contain the keyword
/// (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAttributePattern {
    pub role: SemanticRole,
    pub attribute: String,
    pub keyword: Option<String>,
    pub weight: f64,
}

impl RoleAttributePattern {
    fn new(role: SemanticRole, attribute: &str, keyword: Option<&str>, weight: f64) -> Self {
        Self {
            role,
            attribute: attribute.to_string(),
            keyword: keyword.map(str::to_string),
            weight,
        }
    }
}

fn default_smart_attributes() -> Vec<RoleAttributePattern> {
    use SemanticRole::*;
    vec![
        RoleAttributePattern::new(TextInput, "type", Some("search"), 0.5),
        RoleAttributePattern::new(TextInput, "type", Some("text"), 0.3),
        RoleAttributePattern::new(TextInput, "role", Some("searchbox"), 0.5),
        RoleAttributePattern::new(TextInput, "role", Some("textbox"), 0.45),
        RoleAttributePattern::new(TextInput, "placeholder", None, 0.3),
        RoleAttributePattern::new(TextInput, "aria-label", Some("search"), 0.4),
        RoleAttributePattern::new(TextInput, "name", Some("q"), 0.35),
        RoleAttributePattern::new(TextInput, "name", Some("query"), 0.35),
        RoleAttributePattern::new(TextInput, "name", Some("search"), 0.35),
        RoleAttributePattern::new(TextInput, "data-testid", Some("input"), 0.4),
        RoleAttributePattern::new(TextInput, "data-testid", Some("search"), 0.4),
        RoleAttributePattern::new(Button, "role", Some("button"), 0.5),
        RoleAttributePattern::new(Button, "type", Some("submit"), 0.5),
        RoleAttributePattern::new(Button, "aria-label", Some("submit"), 0.4),
        RoleAttributePattern::new(Button, "aria-label", Some("search"), 0.35),
        RoleAttributePattern::new(Button, "data-testid", Some("submit"), 0.45),
        RoleAttributePattern::new(Button, "data-testid", Some("btn"), 0.3),
        RoleAttributePattern::new(Button, "data-testid", Some("button"), 0.3),
        RoleAttributePattern::new(Link, "href", None, 0.4),
        RoleAttributePattern::new(Link, "role", Some("link"), 0.5),
        RoleAttributePattern::new(Navigation, "role", Some("navigation"), 0.6),
        RoleAttributePattern::new(Navigation, "aria-label", Some("nav"), 0.4),
        RoleAttributePattern::new(ResultItem, "role", Some("listitem"), 0.4),
        RoleAttributePattern::new(ResultItem, "role", Some("article"), 0.45),
        RoleAttributePattern::new(ResultItem, "data-testid", Some("result"), 0.45),
        RoleAttributePattern::new(ResultItem, "data-testid", Some("item"), 0.35),
        RoleAttributePattern::new(ResultItem, "class", Some("result"), 0.3),
        RoleAttributePattern::new(ResultItem, "class", Some("item"), 0.25),
        RoleAttributePattern::new(Image, "role", Some("img"), 0.5),
        RoleAttributePattern::new(Image, "alt", None, 0.4),
        RoleAttributePattern::new(Image, "src", None, 0.3),
    ]
}

/// Incremental scrolling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub step_px: f64,
    pub max_steps: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            step_px: 120.0,
            max_steps: 40,
        }
    }
}

/// Configuration values for the interaction core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuiethandConfig {
    pub verbose: Verbosity,
    /// Overall discovery budget when the locator spec carries none.
    pub resolve_timeout_ms: u64,
    pub action_timeout_ms: u64,
    /// Caller-side retry defaults used by `resolve_with_retry`.
    pub retry_attempts: u32,
    pub retry_pause_ms: u64,
    pub cache_ttl_ms: u64,
    pub thresholds: StrategyThresholds,
    pub timing: TimingConfig,
    pub motion: MotionConfig,
    pub typing: TypingConfig,
    pub semantic: SemanticWeights,
    pub smart_attributes: Vec<RoleAttributePattern>,
    pub scroll: ScrollConfig,
}

impl Default for QuiethandConfig {
    fn default() -> Self {
        Self {
            verbose: Verbosity::default(),
            resolve_timeout_ms: 10_000,
            action_timeout_ms: 30_000,
            retry_attempts: 3,
            retry_pause_ms: 1_000,
            cache_ttl_ms: 2_000,
            thresholds: StrategyThresholds::default(),
            timing: TimingConfig::default(),
            motion: MotionConfig::default(),
            typing: TypingConfig::default(),
            semantic: SemanticWeights::default(),
            smart_attributes: default_smart_attributes(),
            scroll: ScrollConfig::default(),
        }
    }
}

impl QuiethandConfig {
    /// Construct a configuration from `QUIETHAND_*` environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = QuiethandConfig::default();

        if let Some(value) = env_var("QUIETHAND_VERBOSE") {
            let parsed = parse_u8("QUIETHAND_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or(ConfigError::InvalidEnumVariant {
                field: "QUIETHAND_VERBOSE",
                value,
            })?;
        }

        if let Some(value) = env_var("QUIETHAND_RESOLVE_TIMEOUT_MS") {
            config.resolve_timeout_ms = parse_u64("QUIETHAND_RESOLVE_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_ACTION_TIMEOUT_MS") {
            config.action_timeout_ms = parse_u64("QUIETHAND_ACTION_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_RETRY_ATTEMPTS") {
            config.retry_attempts = parse_u64("QUIETHAND_RETRY_ATTEMPTS", &value)? as u32;
        }

        if let Some(value) = env_var("QUIETHAND_RETRY_PAUSE_MS") {
            config.retry_pause_ms = parse_u64("QUIETHAND_RETRY_PAUSE_MS", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_CACHE_TTL_MS") {
            config.cache_ttl_ms = parse_u64("QUIETHAND_CACHE_TTL_MS", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_SMART_ATTRIBUTE_MIN") {
            config.thresholds.smart_attribute_min =
                parse_f64("QUIETHAND_SMART_ATTRIBUTE_MIN", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_CONTENT_MIN") {
            config.thresholds.content_min = parse_f64("QUIETHAND_CONTENT_MIN", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_HEURISTIC_MIN") {
            config.thresholds.heuristic_min = parse_f64("QUIETHAND_HEURISTIC_MIN", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_TIMING") {
            config.timing = parse_json("QUIETHAND_TIMING", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_MOTION") {
            config.motion = parse_json("QUIETHAND_MOTION", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_TYPING") {
            config.typing = parse_json("QUIETHAND_TYPING", &value)?;
        }

        if let Some(value) = env_var("QUIETHAND_SEMANTIC_WEIGHTS") {
            config.semantic = parse_json("QUIETHAND_SEMANTIC_WEIGHTS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants the models rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, dist) in [
            ("timing.pre_click", &self.timing.pre_click),
            ("timing.post_click", &self.timing.post_click),
            ("timing.pre_type", &self.timing.pre_type),
            ("timing.scroll_pause", &self.timing.scroll_pause),
            ("timing.thinking_pause", &self.timing.thinking_pause),
        ] {
            if dist.min_ms > dist.max_ms {
                return Err(ConfigError::InvalidRange {
                    field: name,
                    reason: "min_ms exceeds max_ms",
                });
            }
        }

        if self.motion.min_duration_ms > self.motion.max_duration_ms {
            return Err(ConfigError::InvalidRange {
                field: "motion",
                reason: "min_duration_ms exceeds max_duration_ms",
            });
        }
        if self.motion.min_waypoints == 0 || self.motion.min_waypoints > self.motion.max_waypoints {
            return Err(ConfigError::InvalidRange {
                field: "motion",
                reason: "waypoint bounds are empty or inverted",
            });
        }
        if self.motion.control_points_min > self.motion.control_points_max {
            return Err(ConfigError::InvalidRange {
                field: "motion",
                reason: "control point bounds inverted",
            });
        }

        if self.typing.min_char_delay_ms > self.typing.max_char_delay_ms {
            return Err(ConfigError::InvalidRange {
                field: "typing",
                reason: "min_char_delay_ms exceeds max_char_delay_ms",
            });
        }
        if self.typing.variation_min > self.typing.variation_max {
            return Err(ConfigError::InvalidRange {
                field: "typing",
                reason: "variation bounds inverted",
            });
        }
        if !(0.0..=1.0).contains(&self.typing.think_pause_probability) {
            return Err(ConfigError::InvalidRange {
                field: "typing",
                reason: "think_pause_probability outside [0, 1]",
            });
        }

        for (name, value) in [
            (
                "thresholds.smart_attribute_min",
                self.thresholds.smart_attribute_min,
            ),
            ("thresholds.content_min", self.thresholds.content_min),
            ("thresholds.heuristic_min", self.thresholds.heuristic_min),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidRange {
                    field: name,
                    reason: "threshold outside [0, 1]",
                });
            }
        }

        Ok(())
    }

    /// The attribute patterns applicable to a given role.
    pub fn smart_attributes_for(&self, role: SemanticRole) -> Vec<&RoleAttributePattern> {
        self.smart_attributes
            .iter()
            .filter(|pattern| pattern.role == role)
            .collect()
    }
}

/// Errors that can arise while constructing a [`QuiethandConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid integer '{value}' for {field}: {source}")]
    InvalidInt {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidFloat {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("invalid JSON for {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid range for {field}: {reason}")]
    InvalidRange {
        field: &'static str,
        reason: &'static str,
    },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidInt {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidInt {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| ConfigError::InvalidFloat {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_json<T: serde::de::DeserializeOwned>(
    field: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    serde_json::from_str(value).map_err(|source| ConfigError::InvalidJson { field, source })
}
