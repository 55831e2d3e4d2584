//! Configuration storage operations

use crate::{models::RpcConfig, Result};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

pub struct ConfigStorage {
    config_dir: PathBuf,
}

impl ConfigStorage {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Load the config, writing the default one if the file is missing or empty.
    pub fn load(&self) -> Result<RpcConfig> {
        let config_path = self.path();

        if !config_path.exists() {
            let config = RpcConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;

        if content.trim().is_empty() {
            let config = RpcConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let config: RpcConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &RpcConfig) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.path(), content)?;

        Ok(())
    }

    /// Read an explicit config file without creating anything.
    pub fn load_file(path: &Path) -> Result<RpcConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: RpcConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_default() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().join("lanerpc"));

        let config = storage.load().unwrap();
        assert_eq!(config, RpcConfig::default());
        assert!(storage.path().exists());
    }

    #[test]
    fn test_load_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().to_path_buf());
        std::fs::write(storage.path(), "  \n").unwrap();

        let config = storage.load().unwrap();
        assert_eq!(config, RpcConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().to_path_buf());

        let mut config = RpcConfig::default();
        config.port = 9545;
        config.http.enabled = false;
        storage.save(&config).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.port, 9545);
        assert!(!loaded.http.enabled);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, r#"{"healthcheck_endpoint": "nope"}"#).unwrap();

        assert!(ConfigStorage::load_file(&path).is_err());
    }
}
