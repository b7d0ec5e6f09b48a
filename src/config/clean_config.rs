use serde::{Deserialize, Serialize};

/// Tunable settings for a cleaning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Number of raw CSV rows processed per chunk.
    pub chunk_size: usize,
    /// Reject rows whose parsed quantity is not strictly positive.
    pub drop_zero_quantity: bool,
    /// Emit the rejected-rows sink alongside the clean dataset.
    pub save_rejected_rows: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            drop_zero_quantity: true,
            save_rejected_rows: true,
        }
    }
}

impl CleanConfig {
    pub fn from_file(path: &str) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: CleanConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CleanConfig::default();
        assert_eq!(config.chunk_size, 100_000);
        assert!(config.drop_zero_quantity);
        assert!(config.save_rejected_rows);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: CleanConfig = toml::from_str("chunk_size = 500").unwrap();
        assert_eq!(config.chunk_size, 500);
        assert!(config.drop_zero_quantity);
        assert!(config.save_rejected_rows);
    }

    #[test]
    fn test_full_toml() {
        let config: CleanConfig = toml::from_str(
            "chunk_size = 1000\ndrop_zero_quantity = false\nsave_rejected_rows = false\n",
        )
        .unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert!(!config.drop_zero_quantity);
        assert!(!config.save_rejected_rows);
    }
}
