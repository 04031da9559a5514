//! Sequence configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SequenceError;

fn default_true() -> bool {
    true
}

fn default_columns() -> usize {
    80
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Fail with [`SequenceError::Deadlock`] when no thread can progress.
    #[serde(default = "default_true")]
    pub deadlock_detection: bool,
    /// Abort after this many scheduler ticks.
    #[serde(default)]
    pub max_ticks: Option<u64>,
    /// Grant a multi-cycle request one cycle at a time while other threads
    /// are queued to start.
    #[serde(default = "default_true")]
    pub defer_repeat_for_pending_starts: bool,
    /// Execution profile settings.
    #[serde(default)]
    pub profile: ProfileConfig,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            deadlock_detection: true,
            max_ticks: None,
            defer_repeat_for_pending_starts: true,
            profile: ProfileConfig::default(),
        }
    }
}

/// Execution profile settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Log the rendered profile when a sequence completes.
    #[serde(default)]
    pub enabled: bool,
    /// Timeline width in characters.
    #[serde(default = "default_columns")]
    pub columns: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            columns: default_columns(),
        }
    }
}

impl SequenceConfig {
    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Config`] on malformed input.
    pub fn from_toml_str(input: &str) -> Result<Self, SequenceError> {
        let config: Self = toml::from_str(input).map_err(|e| SequenceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, SequenceError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| SequenceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    /// Check field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Config`] if a field is out of range.
    pub fn validate(&self) -> Result<(), SequenceError> {
        if self.profile.columns == 0 {
            return Err(SequenceError::Config(
                "profile.columns must be at least 1".to_string(),
            ));
        }
        if self.max_ticks == Some(0) {
            return Err(SequenceError::Config(
                "max_ticks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = SequenceConfig::from_toml_str("").unwrap();
        assert_eq!(config, SequenceConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let config = SequenceConfig::from_toml_str(
            r#"
            deadlock_detection = false
            max_ticks = 500

            [profile]
            enabled = true
            columns = 40
            "#,
        )
        .unwrap();
        assert!(!config.deadlock_detection);
        assert_eq!(config.max_ticks, Some(500));
        assert!(config.defer_repeat_for_pending_starts);
        assert_eq!(config.profile.columns, 40);
    }

    #[test]
    fn test_zero_columns_rejected() {
        let err = SequenceConfig::from_toml_str("[profile]\ncolumns = 0").unwrap_err();
        assert!(matches!(err, SequenceError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.toml");
        std::fs::write(&path, "max_ticks = 10\n").unwrap();
        let config = SequenceConfig::from_file(&path).unwrap();
        assert_eq!(config.max_ticks, Some(10));
    }
}
