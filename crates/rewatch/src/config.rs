#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Defaults are suitable for most trees. Values can be overridden in code via
//! the `with_*` builders or from the environment:
//!
//! | Variable | Field | Format |
//! |----------|-------|--------|
//! | `REWATCH_MAX_DEPTH` | `max_depth` | positive integer |
//! | `REWATCH_ISOLATE_PANICS` | `isolate_panics` | `1/0/true/false/yes/no/on/off` |

use std::env;
use std::fmt;

const ENV_MAX_DEPTH: &str = "REWATCH_MAX_DEPTH";
const ENV_ISOLATE_PANICS: &str = "REWATCH_ISOLATE_PANICS";

/// Configuration for one reactive tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactiveConfig {
    /// Maximum nesting depth accepted by wrap and unwrap. The root is depth 1.
    pub max_depth: usize,
    /// Run each watcher under `catch_unwind` so one panicking watcher cannot
    /// block delivery to the rest.
    pub isolate_panics: bool,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            max_depth: 128,
            isolate_panics: true,
        }
    }
}

/// Configuration parse diagnostics (env + validation).
#[derive(Debug, Clone)]
pub struct ConfigParse {
    pub config: ReactiveConfig,
    pub errors: Vec<ConfigError>,
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(
        field: &'static str,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ReactiveConfig {
    /// Set the maximum nesting depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enable or disable per-watcher panic isolation.
    #[must_use]
    pub fn with_isolate_panics(mut self, isolate: bool) -> Self {
        self.isolate_panics = isolate;
        self
    }

    /// Parse config from environment variables, ignoring malformed values.
    #[must_use]
    pub fn from_env() -> ReactiveConfig {
        Self::from_env_with_diagnostics().config
    }

    /// Parse config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> ConfigParse {
        from_env_with(|key| env::var(key).ok())
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.max_depth == 0 {
            errors.push(ConfigError::new(
                "max_depth",
                self.max_depth.to_string(),
                "expected positive integer",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn from_env_with<F>(mut get: F) -> ConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = ReactiveConfig::default();
    let mut errors = Vec::new();

    if let Some(value) = get(ENV_MAX_DEPTH) {
        match parse_usize(&value) {
            Some(parsed) if parsed > 0 => config.max_depth = parsed,
            _ => errors.push(ConfigError::new(
                "max_depth",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Some(value) = get(ENV_ISOLATE_PANICS) {
        match parse_bool(&value) {
            Some(parsed) => config.isolate_panics = parsed,
            None => errors.push(ConfigError::new(
                "isolate_panics",
                value,
                "expected bool (1/0/true/false)",
            )),
        }
    }

    ConfigParse { config, errors }
}

#[inline]
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[inline]
fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(vars: &[(&str, &str)]) -> ConfigParse {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        from_env_with(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let config = ReactiveConfig::default();
        assert_eq!(config.max_depth, 128);
        assert!(config.isolate_panics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_env_yields_defaults() {
        let parsed = parse(&[]);
        assert_eq!(parsed.config, ReactiveConfig::default());
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn env_overrides_fields() {
        let parsed = parse(&[
            ("REWATCH_MAX_DEPTH", " 16 "),
            ("REWATCH_ISOLATE_PANICS", "off"),
        ]);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.config.max_depth, 16);
        assert!(!parsed.config.isolate_panics);
    }

    #[test]
    fn malformed_env_reports_and_keeps_default() {
        let parsed = parse(&[
            ("REWATCH_MAX_DEPTH", "0"),
            ("REWATCH_ISOLATE_PANICS", "maybe"),
        ]);
        assert_eq!(parsed.config, ReactiveConfig::default());
        let fields: Vec<_> = parsed.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["max_depth", "isolate_panics"]);
    }

    #[test]
    fn validate_rejects_zero_depth() {
        let errors = ReactiveConfig::default()
            .with_max_depth(0)
            .validate()
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "max_depth=0 (expected positive integer)");
    }

    #[test]
    fn builders_chain() {
        let config = ReactiveConfig::default()
            .with_max_depth(4)
            .with_isolate_panics(false);
        assert_eq!(config.max_depth, 4);
        assert!(!config.isolate_panics);
    }
}
