//! Configuration for the background statistics scheduler.
//!
//! Settings are read once by the owning server process (typically from a TOML
//! file) and handed to [`crate::lifecycle::StatsBackground`]. Every field has
//! a default, so an empty document is a valid configuration.
//!
//! ```toml
//! persistent_by_default = true
//! auto_recalc = true
//! min_recalc_interval_ms = 10000
//! stats_modified_counter = 0
//! read_only = false
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Minimum time between two background recalculations of the same table.
pub const DEFAULT_MIN_RECALC_INTERVAL_MS: u64 = 10_000;

/// Upper bound accepted for `min_recalc_interval_ms` (one day).
const MAX_MIN_RECALC_INTERVAL_MS: u64 = 86_400_000;

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Whether tables without an explicit option use persistent statistics.
    pub persistent_by_default: bool,

    /// Whether tables without an explicit option are recalculated
    /// automatically once enough rows have changed.
    pub auto_recalc: bool,

    /// Throttle interval for background recalculation, in milliseconds.
    pub min_recalc_interval_ms: u64,

    /// Global override for the transient-statistics threshold.
    ///
    /// When non-zero, the effective threshold is
    /// `min(stats_modified_counter, max(16, n_rows / 16))`.
    pub stats_modified_counter: u64,

    /// Read-only servers never queue background recalculation.
    pub read_only: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            persistent_by_default: true,
            auto_recalc: true,
            min_recalc_interval_ms: DEFAULT_MIN_RECALC_INTERVAL_MS,
            stats_modified_counter: 0,
            read_only: false,
        }
    }
}

impl StatsConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, StatsError> {
        let config: StatsConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, StatsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values the scheduler cannot operate with.
    pub fn validate(&self) -> Result<(), StatsError> {
        if self.min_recalc_interval_ms == 0 {
            return Err(StatsError::Config(
                "min_recalc_interval_ms must be at least 1".into(),
            ));
        }
        if self.min_recalc_interval_ms > MAX_MIN_RECALC_INTERVAL_MS {
            return Err(StatsError::Config(format!(
                "min_recalc_interval_ms must not exceed {MAX_MIN_RECALC_INTERVAL_MS}, got {}",
                self.min_recalc_interval_ms
            )));
        }
        Ok(())
    }

    /// Returns the throttle interval as a [`Duration`].
    pub fn min_recalc_interval(&self) -> Duration {
        Duration::from_millis(self.min_recalc_interval_ms)
    }

    /// Returns the transient threshold override, if one is configured.
    pub fn modified_counter_override(&self) -> Option<u64> {
        (self.stats_modified_counter > 0).then_some(self.stats_modified_counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatsErrorKind;

    #[test]
    fn test_defaults() {
        let config = StatsConfig::default();
        assert!(config.persistent_by_default);
        assert!(config.auto_recalc);
        assert_eq!(config.min_recalc_interval(), Duration::from_secs(10));
        assert_eq!(config.modified_counter_override(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StatsConfig::from_toml_str("").unwrap();
        assert_eq!(config, StatsConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = StatsConfig::from_toml_str(
            "min_recalc_interval_ms = 250\nstats_modified_counter = 8\n",
        )
        .unwrap();
        assert_eq!(config.min_recalc_interval(), Duration::from_millis(250));
        assert_eq!(config.modified_counter_override(), Some(8));
        assert!(config.persistent_by_default);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = StatsConfig::from_toml_str("min_recalc_interval_ms = 0").unwrap_err();
        assert_eq!(err.kind(), StatsErrorKind::Config);
    }

    #[test]
    fn test_huge_interval_rejected() {
        let config = StatsConfig {
            min_recalc_interval_ms: MAX_MIN_RECALC_INTERVAL_MS + 1,
            ..StatsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_document() {
        let err = StatsConfig::from_toml_str("auto_recalc = \"maybe\"").unwrap_err();
        assert!(matches!(err, StatsError::ConfigParse(_)));
    }
}
