//! Processor tuning loaded from TOML
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! query_timeout_ms = 2000
//! spectrum_poll_ms = 100
//! message_buffer_reports = 20
//! rolling_queue_entries = 30000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tuning shared by every processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// How long a configuration query waits for its response
    pub query_timeout_ms: u64,
    /// Interval between spectrum requests while acquiring (polled links)
    pub spectrum_poll_ms: u64,
    /// Message buffer size, in maximum-size reports (explicit-length links)
    pub message_buffer_reports: usize,
    /// Rolling queue depth (implicit-size links)
    pub rolling_queue_entries: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 2000,
            spectrum_poll_ms: 100,
            message_buffer_reports: 20,
            rolling_queue_entries: 30_000,
        }
    }
}

impl ProcessorConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn spectrum_poll(&self) -> Duration {
        Duration::from_millis(self.spectrum_poll_ms)
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.message_buffer_reports == 0 {
            return Err(Error::Config(
                "message_buffer_reports must be at least 1".into(),
            ));
        }
        if self.rolling_queue_entries == 0 {
            return Err(Error::Config(
                "rolling_queue_entries must be at least 1".into(),
            ));
        }
        if self.spectrum_poll_ms == 0 {
            return Err(Error::Config("spectrum_poll_ms must be non-zero".into()));
        }
        Ok(())
    }
}
