//! Session tunables, read from YAML.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```yaml
//! line_height_px: 160
//! tick_ms: 50
//! resync_settle_ms: 500
//! bars_per_line: 4
//! default_tempo: 120
//! offline_port: 8765
//! offline_retry_ms: 1000
//! offline_channel: chordflow-local-guest-sync
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chord_grid::DEFAULT_BARS_PER_LINE;
use crate::error::{LiveError, Result};
use crate::offline::{DEFAULT_PORT, GUEST_SYNC_CHANNEL};
use crate::scroll::BASELINE_LINE_HEIGHT_PX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Line height the scroll multiplier scales.
    pub line_height_px: f64,
    pub tick_ms: u64,
    /// Delay before a new subscriber gets the full-state resync.
    pub resync_settle_ms: u64,
    pub bars_per_line: usize,
    pub default_tempo: u32,
    pub offline_port: u16,
    /// Delay before a guest repeats its sync request.
    pub offline_retry_ms: u64,
    pub offline_channel: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            line_height_px: BASELINE_LINE_HEIGHT_PX,
            tick_ms: 50,
            resync_settle_ms: 500,
            bars_per_line: DEFAULT_BARS_PER_LINE,
            default_tempo: 120,
            offline_port: DEFAULT_PORT,
            offline_retry_ms: 1000,
            offline_channel: GUEST_SYNC_CHANNEL.to_string(),
        }
    }
}

impl LiveConfig {
    /// Parse and validate a YAML document.
    ///
    /// # Example
    /// ```
    /// use chordflow::config::LiveConfig;
    ///
    /// let config = LiveConfig::from_yaml_str("bars_per_line: 2\n").unwrap();
    /// assert_eq!(config.bars_per_line, 2);
    /// assert_eq!(config.tick_ms, 50);
    /// ```
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let config: LiveConfig = if source.trim().is_empty() {
            LiveConfig::default()
        } else {
            serde_yaml::from_str(source)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(LiveError::Config("tick_ms must be positive".to_string()));
        }
        if self.bars_per_line == 0 {
            return Err(LiveError::Config("bars_per_line must be positive".to_string()));
        }
        if !(self.line_height_px > 0.0) {
            return Err(LiveError::Config("line_height_px must be positive".to_string()));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn resync_settle(&self) -> Duration {
        Duration::from_millis(self.resync_settle_ms)
    }

    pub fn offline_retry(&self) -> Duration {
        Duration::from_millis(self.offline_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LiveConfig::from_yaml_str("").unwrap();
        assert_eq!(config, LiveConfig::default());
        assert_eq!(config.line_height_px, 160.0);
        assert_eq!(config.tick(), Duration::from_millis(50));
        assert_eq!(config.resync_settle(), Duration::from_millis(500));
        assert_eq!(config.offline_port, 8765);
        assert_eq!(config.offline_channel, "chordflow-local-guest-sync");
    }

    #[test]
    fn test_partial_override() {
        let config = LiveConfig::from_yaml_str("offline_port: 9000\nresync_settle_ms: 250\n").unwrap();
        assert_eq!(config.offline_port, 9000);
        assert_eq!(config.resync_settle_ms, 250);
        assert_eq!(config.bars_per_line, 4);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            LiveConfig::from_yaml_str("tick_ms: 0\n"),
            Err(LiveError::Config(_))
        ));
        assert!(LiveConfig::from_yaml_str("bars_per_line: [1]\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = LiveConfig::load("/nonexistent/chordflow.yaml").unwrap_err();
        assert!(matches!(err, LiveError::Io(_)));
    }
}
