// ABOUTME: Configuration loading and validation for promptui hosts.
// ABOUTME: Reads PROMPTUI_* environment variables with defaults for format, history, and archiving.

use std::path::PathBuf;

use promptui_core::OutputFormat;
use thiserror::Error;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PROMPTUI_FORMAT must be markdown or html, got {0}")]
    InvalidFormat(String),

    #[error("PROMPTUI_HISTORY_LIMIT must be a positive integer, got {0}")]
    InvalidHistoryLimit(String),
}

/// Host configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PromptuiConfig {
    pub home: PathBuf,
    pub format: OutputFormat,
    pub history_limit: usize,
    pub snapshots: bool,
}

impl Default for PromptuiConfig {
    fn default() -> Self {
        Self {
            home: default_home(None),
            format: OutputFormat::Markdown,
            history_limit: DEFAULT_HISTORY_LIMIT,
            snapshots: true,
        }
    }
}

fn default_home(home_dir: Option<String>) -> PathBuf {
    home_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".promptui")
}

impl PromptuiConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - PROMPTUI_HOME: snapshot archive directory (default: ~/.promptui)
    /// - PROMPTUI_FORMAT: markdown or html (default: markdown)
    /// - PROMPTUI_HISTORY_LIMIT: max session history entries, at least 1 (default: 50)
    /// - PROMPTUI_SNAPSHOTS: archive rendered prompts (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PromptuiConfig::from_env`] with variables read through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let home = lookup("PROMPTUI_HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_home(lookup("HOME")));

        let format = match lookup("PROMPTUI_FORMAT").filter(|f| !f.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidFormat(raw))?,
            None => OutputFormat::Markdown,
        };

        let history_limit = match lookup("PROMPTUI_HISTORY_LIMIT").filter(|l| !l.is_empty()) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(limit) if limit >= 1 => limit,
                _ => return Err(ConfigError::InvalidHistoryLimit(raw)),
            },
            None => DEFAULT_HISTORY_LIMIT,
        };

        let snapshots = lookup("PROMPTUI_SNAPSHOTS")
            .map(|v| !matches!(v.as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        Ok(Self {
            home,
            format,
            history_limit,
            snapshots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn config_loads_defaults() {
        // SAFETY: test-only code, single-threaded test execution
        unsafe {
            std::env::remove_var("PROMPTUI_HOME");
            std::env::remove_var("PROMPTUI_FORMAT");
            std::env::remove_var("PROMPTUI_HISTORY_LIMIT");
            std::env::remove_var("PROMPTUI_SNAPSHOTS");
        }

        let config = PromptuiConfig::from_env().unwrap();

        assert_eq!(config.format, OutputFormat::Markdown);
        assert_eq!(config.history_limit, 50);
        assert!(config.snapshots);
        assert!(config.home.to_string_lossy().contains(".promptui"));
    }

    #[test]
    fn config_reads_overrides() {
        let config = PromptuiConfig::from_lookup(lookup(&[
            ("PROMPTUI_HOME", "/srv/promptui"),
            ("PROMPTUI_FORMAT", "html"),
            ("PROMPTUI_HISTORY_LIMIT", "5"),
            ("PROMPTUI_SNAPSHOTS", "no"),
        ]))
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/promptui"));
        assert_eq!(config.format, OutputFormat::Html);
        assert_eq!(config.history_limit, 5);
        assert!(!config.snapshots);
    }

    #[test]
    fn config_home_defaults_under_user_home() {
        let config = PromptuiConfig::from_lookup(lookup(&[("HOME", "/home/ada")])).unwrap();
        assert_eq!(config.home, PathBuf::from("/home/ada/.promptui"));
    }

    #[test]
    fn config_rejects_unknown_format() {
        let err = PromptuiConfig::from_lookup(lookup(&[("PROMPTUI_FORMAT", "pdf")])).unwrap_err();
        assert!(
            err.to_string().contains("PROMPTUI_FORMAT"),
            "error should name the variable: {}",
            err
        );
    }

    #[test]
    fn config_rejects_zero_history_limit() {
        for raw in ["0", "-3", "many"] {
            let err = PromptuiConfig::from_lookup(lookup(&[("PROMPTUI_HISTORY_LIMIT", raw)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidHistoryLimit(ref v) if v == raw));
        }
    }
}
