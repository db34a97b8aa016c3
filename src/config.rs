use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/server.json";

pub const LISTEN_ADDR_ENV: &str = "CHAT_LISTEN_ADDR";
pub const DATABASE_PATH_ENV: &str = "CHAT_DATABASE_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_addr: String,
    pub database_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            database_path: "data/chat.db".to_string(),
        }
    }
}

impl AppConfig {
    /// Apply overrides from a variable lookup (normally the process env).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(LISTEN_ADDR_ENV).filter(|v| !v.is_empty()) {
            self.listen_addr = addr;
        }
        if let Some(path) = lookup(DATABASE_PATH_ENV).filter(|v| !v.is_empty()) {
            self.database_path = path;
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("portal-chat-{}-{name}", std::process::id()));
        dir.join("server.json").to_string_lossy().into_owned()
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(&scratch_path("missing"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn saved_config_loads_back() {
        let path = scratch_path("saved");
        let config = AppConfig {
            listen_addr: "127.0.0.1:6000".to_string(),
            database_path: "/tmp/chat.db".to_string(),
        };
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path), config);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let path = scratch_path("partial");
        save_config(&path, &AppConfig::default()).unwrap();
        fs::write(&path, r#"{ "listen_addr": "127.0.0.1:7000" }"#).unwrap();

        let config = load_config(&path);
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.database_path, AppConfig::default().database_path);
    }

    #[test]
    fn env_overrides_ignore_empty_values() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            LISTEN_ADDR_ENV => Some("127.0.0.1:9000".to_string()),
            DATABASE_PATH_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.database_path, "data/chat.db");
    }
}
