use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::modules::relay::DEFAULT_RELAY_URL;

pub const DEFAULT_PROJECT_ID: &str = "12c6e3fe-46e1-4eb7-b16e-073bf99501e0";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Desktop,
    Emulator,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub project_id: String,
    pub device: DeviceKind,
    pub relay_url: String,
    pub refresh_interval_secs: u64,
    pub topic: String,
    pub log_level: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            device: DeviceKind::Desktop,
            relay_url: DEFAULT_RELAY_URL.to_string(),
            refresh_interval_secs: 5,
            topic: "test-topic".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub path: PathBuf,
    pub project_id: String,
    pub device: DeviceKind,
    pub relay_url: String,
    pub refresh_interval_secs: u64,
    pub topic: String,
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(config_path()?)
    }

    /// Like [`Config::load`], but a broken or unreadable file yields the defaults.
    /// Used by `send`, which only needs the relay URL.
    pub fn load_or_default() -> Self {
        match config_path() {
            Ok(path) => Self::load_from_or_default(path),
            Err(e) => {
                eprintln!("Warning: {:#}, using default settings", e);
                Self::from_file(PathBuf::new(), ConfigFile::default())
            }
        }
    }

    fn load_from_or_default(path: PathBuf) -> Self {
        match Self::load_from(path.clone()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}, using default settings", e);
                Self::from_file(path, ConfigFile::default())
            }
        }
    }

    fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            let default = ConfigFile::default();
            let toml = toml::to_string_pretty(&default)?;
            if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
            fs::write(&path, toml)?;
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Reading {:?}", &path))?;
        let cfg: ConfigFile = toml::from_str(&content).with_context(|| "Parsing config TOML")?;
        Ok(Self::from_file(path, cfg))
    }

    fn from_file(path: PathBuf, cfg: ConfigFile) -> Self {
        Self {
            path,
            project_id: cfg.project_id,
            device: cfg.device,
            relay_url: cfg.relay_url,
            refresh_interval_secs: cfg.refresh_interval_secs.max(1),
            topic: cfg.topic,
            log_level: cfg.log_level,
        }
    }
}

fn config_path() -> Result<PathBuf> {
    let base = config_dir().context("Could not determine config directory")?;
    Ok(base.join("pushdeck").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let cfg: ConfigFile = toml::from_str("device = \"emulator\"\ntopic = \"news\"\n").unwrap();
        assert_eq!(cfg.device, DeviceKind::Emulator);
        assert_eq!(cfg.topic, "news");
        assert_eq!(cfg.project_id, DEFAULT_PROJECT_ID);
        assert_eq!(cfg.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(cfg.refresh_interval_secs, 5);
    }

    #[test]
    fn default_file_round_trips() {
        let text = toml::to_string_pretty(&ConfigFile::default()).unwrap();
        let parsed: ConfigFile = toml::from_str(&text).unwrap();
        assert_eq!(parsed, ConfigFile::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("pushdeck-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, "relay_url = [not toml").unwrap();

        assert!(Config::load_from(path.clone()).is_err());
        let config = Config::load_from_or_default(path);
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(config.project_id, DEFAULT_PROJECT_ID);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn zero_refresh_interval_is_clamped() {
        let cfg: ConfigFile = toml::from_str("refresh_interval_secs = 0").unwrap();
        let config = Config::from_file(PathBuf::from("config.toml"), cfg);
        assert_eq!(config.refresh_interval_secs, 1);
    }
}
