//! Configuration loading and schema definitions for pacer.
//!
//! This module loads pacer configuration from TOML files or strings and
//! resolves the batching strategy it describes. Strategy configuration is
//! validated eagerly: a configuration that loads successfully always builds
//! a strategy, so mistakes surface before the first device asks for work.
//!
//! # Environment variables
//!
//! `$VAR` and `${VAR}` references in the file are replaced with the
//! variable's value before parsing. References to unset variables are left
//! as written.
//!
//! # Relative paths
//!
//! Paths in a configuration file (`analytics.history_file`) are relative to
//! the directory containing the file, not the working directory.

pub mod schema;

pub use schema::*;

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};

/// A batching configuration that cannot be turned into a strategy.
///
/// Every variant names the strategy type and the offending field.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An annotation pattern is not a valid regular expression.
    #[error("{strategy}: invalid pattern in `{field}` ({pattern:?}): {source}")]
    InvalidPattern {
        strategy: &'static str,
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A field is required because another field is set.
    #[error("{strategy}: `{field}` is required when `{required_by}` is set")]
    MissingField {
        strategy: &'static str,
        field: &'static str,
        required_by: &'static str,
    },

    /// A field is set but has no effect in this combination.
    #[error("{strategy}: `{field}` is not allowed here: {reason}")]
    UnexpectedField {
        strategy: &'static str,
        field: &'static str,
        reason: &'static str,
    },

    /// A field has a value outside its accepted range.
    #[error("{strategy}: invalid value for `{field}`: {reason}")]
    InvalidValue {
        strategy: &'static str,
        field: &'static str,
        reason: String,
    },
}

/// Loads and validates pacer configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file contains invalid TOML syntax or an unknown strategy `type`
/// - The batching strategy configuration is invalid (see [`ConfigError`])
///
/// # Example
///
/// ```no_run
/// use pacer::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("pacer.toml"))?;
/// println!("Devices: {}", config.pacer.devices);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config = toml::from_str(&substitute_env(&content))
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    config
        .batching
        .build()
        .with_context(|| format!("Invalid batching strategy in {}", path.display()))?;

    if let Some(dir) = path.parent() {
        config.resolve_paths(dir);
    }

    Ok(config)
}

/// Loads and validates pacer configuration from a TOML string.
///
/// Relative paths are kept as written.
///
/// # Example
///
/// ```
/// use pacer::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [pacer]
///     devices = 4
///
///     [batching]
///     type = "fixed-size"
///     size = 5
/// "#)?;
///
/// assert_eq!(config.pacer.devices, 4);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(&substitute_env(content)).context("Failed to parse config")?;

    config
        .batching
        .build()
        .context("Invalid batching strategy")?;

    Ok(config)
}

fn substitute_env(content: &str) -> Cow<'_, str> {
    substitute_env_with(content, |name| std::env::var(name).ok())
}

fn substitute_env_with<F>(content: &str, lookup: F) -> Cow<'_, str>
where
    F: FnMut(&str) -> Option<String>,
{
    shellexpand::env_with_context_no_errors(content, lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [batching]
            type = "class-name"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.batching, BatchingStrategyConfig::ClassName);
        assert_eq!(config.pacer.devices, 4);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/pacer.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = load_config_str(
            r#"
            [batching]
            type = "round-robin"
            "#,
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("unknown variant"));
    }

    #[test]
    fn test_invalid_strategy_is_rejected_at_load() {
        let err = load_config_str(
            r#"
            [batching]
            type = "mixed"
            union_annotation_name = "(oops"
            "#,
        )
        .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Invalid batching strategy"));
        assert!(message.contains("union_annotation_name"));
    }

    #[test]
    fn test_relative_history_file_resolves_against_config_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_dir = dir.path().join("cfg");
        std::fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join("pacer.toml");
        std::fs::write(
            &config_path,
            r#"
            [batching]
            type = "isolate"

            [analytics]
            history_file = ".pacer/durations.json"
            "#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();

        assert_eq!(
            config.analytics.history_file,
            Some(config_dir.join(".pacer/durations.json"))
        );
    }

    #[test]
    fn test_absolute_history_file_is_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let history = dir.path().join("durations.json");
        let config_path = dir.path().join("cfg").join("pacer.toml");
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(
            &config_path,
            format!(
                "[batching]\ntype = \"isolate\"\n\n[analytics]\nhistory_file = {:?}\n",
                history.display().to_string()
            ),
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();

        assert_eq!(config.analytics.history_file, Some(history));
    }

    #[test]
    fn test_substitute_env_replaces_set_variables() {
        let lookup = |name: &str| (name == "PACER_DEVICES").then(|| "6".to_string());

        assert_eq!(
            substitute_env_with("devices = ${PACER_DEVICES}", lookup),
            "devices = 6"
        );
        assert_eq!(
            substitute_env_with("devices = $PACER_DEVICES", lookup),
            "devices = 6"
        );
    }

    #[test]
    fn test_substitute_env_keeps_unset_variables() {
        let lookup = |_: &str| None::<String>;

        assert_eq!(
            substitute_env_with(r#"history_file = "${PACER_UNSET}/d.json""#, lookup),
            r#"history_file = "${PACER_UNSET}/d.json""#
        );
        assert_eq!(
            substitute_env_with(r#"union_annotation_name = ".*Union$""#, lookup),
            r#"union_annotation_name = ".*Union$""#
        );
    }

    #[test]
    fn test_load_config_reads_environment() {
        // Only this test reads PACER_TEST_BATCH_SIZE.
        unsafe { std::env::set_var("PACER_TEST_BATCH_SIZE", "7") };

        let config = load_config_str(
            r#"
            [batching]
            type = "fixed-size"
            size = ${PACER_TEST_BATCH_SIZE}
            "#,
        )
        .unwrap();

        match config.batching {
            BatchingStrategyConfig::FixedSize(cfg) => assert_eq!(cfg.size, 7),
            other => panic!("unexpected strategy: {:?}", other),
        }
    }

    #[test]
    fn test_load_config_keeps_unset_reference() {
        let err = load_config_str(
            r#"
            [batching]
            type = "fixed-size"
            size = ${PACER_TEST_NEVER_SET}
            "#,
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }
}
