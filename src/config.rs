// SPDX-License-Identifier: MIT
//! Tool configuration, from the environment or a TOML file

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
    /// Spaces per nesting level in text dumps
    pub dump_indent: usize,
    /// Refuse partial rewrites of files whose checksum is already wrong
    pub verify_before_overwrite: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            dump_indent: 2,
            verify_before_overwrite: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_filter: std::env::var("PARAM_LOG").unwrap_or(defaults.log_filter),
            dump_indent: std::env::var("PARAM_DUMP_INDENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.dump_indent),
            verify_before_overwrite: std::env::var("PARAM_VERIFY_BEFORE_OVERWRITE")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.verify_before_overwrite),
        }
    }

    /// Load from a TOML file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("Invalid configuration: {}", e))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.log_filter.trim().is_empty() {
            return Err("PARAM_LOG cannot be empty".to_string());
        }

        if !(1..=8).contains(&self.dump_indent) {
            return Err("PARAM_DUMP_INDENT must be between 1 and 8".to_string());
        }

        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = Config::from_toml("dump_indent = 4\n").unwrap();
        assert_eq!(config.dump_indent, 4);
        assert_eq!(config.log_filter, "info");
        assert!(config.verify_before_overwrite);
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        assert!(Config::from_toml("dump_indent = \"wide\"\n").is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.dump_indent = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.log_filter = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paramtool.toml");
        std::fs::write(&path, "log_filter = \"debug\"\nverify_before_overwrite = false\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.log_filter, "debug");
        assert!(!config.verify_before_overwrite);
    }
}
