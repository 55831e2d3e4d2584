pub mod config;

pub use config::ConfigStorage;

use std::path::PathBuf;

/// `<platform config dir>/lanerpc`, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lanerpc"))
}

pub fn init_config_dir() -> crate::Result<PathBuf> {
    let config_dir = default_config_dir().ok_or_else(|| {
        crate::Error::Validation("Could not find config directory".to_string())
    })?;
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}
