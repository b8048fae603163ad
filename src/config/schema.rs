//! Configuration schema definitions for pacer.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── PacerConfig              - Run settings (device count)
//! ├── BatchingStrategyConfig   - Tagged enum selecting the batching strategy
//! │   ├── FixedSize            - Up to N tests, optionally duration-bounded
//! │   ├── Isolate              - One test per batch
//! │   ├── ClassName            - All tests of one class
//! │   └── Mixed                - Class grouping plus annotation unions
//! └── AnalyticsConfig          - Where duration history comes from
//! ```
//!
//! Field names are snake_case. The camelCase spellings used by other tools
//! (`durationMillis`, `lastMileLength`, ...) are accepted as aliases.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::strategy::{
    AnnotationPattern, ClassNameStrategy, DurationBudget, FixedSizeStrategy, IsolateStrategy,
    MixedStrategy, Strategy,
};

/// Root configuration structure for pacer.
///
/// # TOML Structure
///
/// ```toml
/// [pacer]
/// devices = 4
///
/// [batching]
/// type = "fixed-size"
/// size = 10
/// duration_millis = 120000
/// percentile = 90.0
/// last_mile_length = 3
///
/// [analytics]
/// history_file = ".pacer/durations.json"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Run settings (optional, has defaults).
    #[serde(default)]
    pub pacer: PacerConfig,

    /// The batching strategy for the run.
    pub batching: BatchingStrategyConfig,

    /// Duration history settings (optional, has defaults).
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl Config {
    /// Joins relative paths onto `base`. Absolute paths are left alone.
    ///
    /// [`load_config`](super::load_config) calls this with the directory of
    /// the configuration file.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(path) = self.analytics.history_file.as_mut()
            && path.is_relative()
        {
            let resolved = base.join(&*path);
            *path = resolved;
        }
    }
}

/// Core run settings.
///
/// | Field | Default |
/// |-------|---------|
/// | `devices` | 4 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PacerConfig {
    /// Number of devices pulling batches concurrently.
    ///
    /// Minimum is 1 (values below 1 are clamped to 1 by the CLI).
    #[serde(default = "default_devices")]
    pub devices: usize,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            devices: default_devices(),
        }
    }
}

fn default_devices() -> usize {
    4
}

/// Where duration estimates come from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    /// JSON file with recorded test durations.
    ///
    /// Without it every test has no history, and duration budgets never
    /// limit a batch.
    pub history_file: Option<PathBuf>,
}

/// Batching strategy configuration, selected by the `type` field.
///
/// | Type | Description |
/// |------|-------------|
/// | `fixed-size` | Up to `size` tests, optionally bounded by estimated duration |
/// | `isolate` | Every test alone |
/// | `class-name` | All queued tests of one class together |
/// | `mixed` | Class grouping for plain tests, unions for annotated ones |
///
/// # Example
///
/// ```toml
/// [batching]
/// type = "mixed"
/// isolate_annotation_name = ".*Isolated"
/// union_annotation_name = ".*Union"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BatchingStrategyConfig {
    /// Batches of at most `size` tests.
    FixedSize(FixedSizeConfig),

    /// One test per batch.
    Isolate,

    /// One class per batch.
    ClassName,

    /// Class grouping with annotation-driven isolation and unions.
    Mixed(MixedConfig),
}

/// Settings for the `fixed-size` strategy.
///
/// # Example
///
/// ```toml
/// [batching]
/// type = "fixed-size"
/// size = 10
/// duration_millis = 120000      # 2 minutes per batch
/// percentile = 90.0             # trust the p90 of each test's history
/// time_limit = "2024-05-01T00:00:00Z"  # ignore history older than this
/// last_mile_length = 3
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FixedSizeConfig {
    /// Maximum number of tests per batch. Must be at least 1.
    pub size: usize,

    /// Estimated-duration budget per batch, in milliseconds.
    ///
    /// Requires `percentile`.
    #[serde(default, alias = "durationMillis", skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<u64>,

    /// Percentile (0-100] of each test's history used as its estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,

    /// Only history recorded at or after this instant (RFC 3339) counts.
    #[serde(default, alias = "timeLimit", skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<DateTime<Utc>>,

    /// When fewer than this many tests would remain after a batch, the batch
    /// takes them all.
    ///
    /// Default: 0 (disabled)
    #[serde(default, alias = "lastMileLength")]
    pub last_mile_length: usize,
}

/// Settings for the `mixed` strategy.
///
/// Patterns are regular expressions matched against the whole annotation
/// name. An absent pattern matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MixedConfig {
    /// Annotations marking tests that must run alone.
    #[serde(default, alias = "isolateAnnotationName")]
    pub isolate_annotation_name: Option<String>,

    /// Annotations whose `value` groups tests into one batch.
    #[serde(default, alias = "unionAnnotationName")]
    pub union_annotation_name: Option<String>,
}

impl BatchingStrategyConfig {
    /// Every accepted `type` tag.
    pub const TYPE_NAMES: [&'static str; 4] = ["fixed-size", "isolate", "class-name", "mixed"];

    /// Returns the `type` discriminator of this configuration.
    pub fn type_name(&self) -> &'static str {
        match self {
            BatchingStrategyConfig::FixedSize(_) => "fixed-size",
            BatchingStrategyConfig::Isolate => "isolate",
            BatchingStrategyConfig::ClassName => "class-name",
            BatchingStrategyConfig::Mixed(_) => "mixed",
        }
    }

    /// Validates the configuration and builds the strategy it describes.
    ///
    /// # Example
    ///
    /// ```
    /// use pacer::config::{BatchingStrategyConfig, MixedConfig};
    ///
    /// let config = BatchingStrategyConfig::Mixed(MixedConfig {
    ///     isolate_annotation_name: Some("(unclosed".to_string()),
    ///     union_annotation_name: None,
    /// });
    ///
    /// let err = config.build().unwrap_err();
    /// assert!(err.to_string().contains("isolate_annotation_name"));
    /// ```
    pub fn build(&self) -> Result<Strategy, ConfigError> {
        match self {
            BatchingStrategyConfig::FixedSize(cfg) => cfg.build().map(Strategy::FixedSize),
            BatchingStrategyConfig::Isolate => Ok(Strategy::Isolate(IsolateStrategy)),
            BatchingStrategyConfig::ClassName => Ok(Strategy::ClassName(ClassNameStrategy)),
            BatchingStrategyConfig::Mixed(cfg) => cfg.build().map(Strategy::Mixed),
        }
    }
}

impl FixedSizeConfig {
    const TYPE: &'static str = "fixed-size";

    fn build(&self) -> Result<FixedSizeStrategy, ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::InvalidValue {
                strategy: Self::TYPE,
                field: "size",
                reason: "must be at least 1".to_string(),
            });
        }

        let mut strategy =
            FixedSizeStrategy::new(self.size).with_last_mile_length(self.last_mile_length);

        match (self.duration_millis, self.percentile) {
            (Some(limit), Some(percentile)) => {
                if !(percentile > 0.0 && percentile <= 100.0) {
                    return Err(ConfigError::InvalidValue {
                        strategy: Self::TYPE,
                        field: "percentile",
                        reason: format!("{} is outside (0, 100]", percentile),
                    });
                }
                strategy = strategy.with_duration_budget(DurationBudget {
                    limit: std::time::Duration::from_millis(limit),
                    percentile,
                });
            }
            (Some(_), None) => {
                return Err(ConfigError::MissingField {
                    strategy: Self::TYPE,
                    field: "percentile",
                    required_by: "duration_millis",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::UnexpectedField {
                    strategy: Self::TYPE,
                    field: "percentile",
                    reason: "it only applies together with `duration_millis`",
                });
            }
            (None, None) => {}
        }

        if let Some(since) = self.time_limit {
            strategy = strategy.with_time_limit(since);
        }

        Ok(strategy)
    }
}

impl MixedConfig {
    const TYPE: &'static str = "mixed";

    fn build(&self) -> Result<MixedStrategy, ConfigError> {
        let isolate = compile(
            "isolate_annotation_name",
            self.isolate_annotation_name.as_deref(),
        )?;
        let union = compile("union_annotation_name", self.union_annotation_name.as_deref())?;
        Ok(MixedStrategy::new(isolate, union))
    }
}

fn compile(
    field: &'static str,
    pattern: Option<&str>,
) -> Result<Option<AnnotationPattern>, ConfigError> {
    pattern
        .map(|p| {
            AnnotationPattern::new(p).map_err(|source| ConfigError::InvalidPattern {
                strategy: MixedConfig::TYPE,
                field,
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()
}
