//! Driver context tuning loaded from TOML
//!
//! ```toml
//! update_interval_ms = 5
//!
//! [processor]
//! query_timeout_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use radsdk_core::{Error, ProcessorConfig};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// How often the update thread checks acquisition targets
    pub update_interval_ms: u64,
    /// Tuning for the processors built for attached devices
    pub processor: ProcessorConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 5,
            processor: ProcessorConfig::default(),
        }
    }
}

impl ContextConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
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

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.update_interval_ms == 0 {
            return Err(Error::Config("update_interval_ms must be non-zero".into()).into());
        }
        self.processor.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ContextConfig::from_toml_str("").unwrap();
        assert_eq!(config, ContextConfig::default());
        assert_eq!(config.update_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_nested_processor_table() {
        let config = ContextConfig::from_toml_str(
            "update_interval_ms = 20\n[processor]\nspectrum_poll_ms = 250\n",
        )
        .unwrap();
        assert_eq!(config.update_interval_ms, 20);
        assert_eq!(config.processor.spectrum_poll_ms, 250);
        assert_eq!(config.processor.query_timeout_ms, 2000);
    }

    #[test]
    fn test_renders_back_to_toml() {
        let config = ContextConfig {
            update_interval_ms: 15,
            ..ContextConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("update_interval_ms = 15"));
        assert!(text.contains("[processor]"));
        assert_eq!(ContextConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid() {
        for text in [
            "update_interval_ms = 0",
            "[processor]\nmessage_buffer_reports = 0",
            "poll = 1",
        ] {
            assert!(matches!(
                ContextConfig::from_toml_str(text),
                Err(DeviceError::Core(Error::Config(_)))
            ));
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "update_interval_ms = 10").unwrap();
        let config = ContextConfig::from_file(file.path()).unwrap();
        assert_eq!(config.update_interval_ms, 10);

        let missing = file.path().with_extension("missing");
        assert!(ContextConfig::from_file(&missing).is_err());
    }
}
