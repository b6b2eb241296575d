//! Configuration loading for Parley.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acl::AgentId;
use crate::error::{Error, Result};

/// Environment variable overriding the Parley home directory.
pub const HOME_ENV: &str = "PARLEY_HOME";

/// Get the Parley home directory (`$PARLEY_HOME`, else ~/.parley).
pub fn get_home_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".parley"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from the home directory.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load settings from a specific file.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'parley init' first.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

/// Write settings as pretty JSON, creating parent directories.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;

    tracing::info!("Saved settings to {}", path.display());
    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.protocol.session_timeout_secs == 0 {
        return Err(Error::Config(
            "protocol.session_timeout_secs must be greater than zero".to_string(),
        ));
    }

    if settings.workers.max_concurrent == 0 {
        return Err(Error::Config(
            "workers.max_concurrent must be greater than zero".to_string(),
        ));
    }

    let demo = &settings.demo;
    if demo.recipients.is_empty() {
        return Err(Error::Config("demo.recipients must not be empty".to_string()));
    }

    let mut agents = vec![&demo.sender, &demo.calculator];
    agents.extend(demo.recipients.iter());
    for agent in &agents {
        agent
            .parse::<AgentId>()
            .map_err(|e| Error::Config(format!("demo agent '{}': {}", agent, e)))?;
    }

    for (i, agent) in agents.iter().enumerate() {
        if agents[..i].contains(agent) {
            return Err(Error::Config(format!(
                "demo agent '{}' is listed more than once",
                agent
            )));
        }
    }

    Ok(())
}

/// Protocol configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProtocolSettings {
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

fn default_session_timeout_secs() -> u64 {
    crate::protocol::DEFAULT_SESSION_TIMEOUT.as_secs()
}

impl ProtocolSettings {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
        }
    }
}

/// Worker pool configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkerSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    crate::runtime::worker::DEFAULT_MAX_CONCURRENT
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Demo society configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DemoSettings {
    #[serde(default = "default_start_delay_secs")]
    pub start_delay_secs: u64,
    #[serde(default = "default_work_millis")]
    pub work_millis: u64,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_recipients")]
    pub recipients: Vec<String>,
    #[serde(default = "default_calculator")]
    pub calculator: String,
}

fn default_start_delay_secs() -> u64 {
    2
}

fn default_work_millis() -> u64 {
    500
}

fn default_sender() -> String {
    "alfa@localhost:61000".to_string()
}

fn default_recipients() -> Vec<String> {
    vec![
        "bravo@localhost:52000".to_string(),
        "charlie@localhost:50001".to_string(),
    ]
}

fn default_calculator() -> String {
    "calculator@localhost:55000".to_string()
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            start_delay_secs: default_start_delay_secs(),
            work_millis: default_work_millis(),
            sender: default_sender(),
            recipients: default_recipients(),
            calculator: default_calculator(),
        }
    }
}

/// Parley settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub protocol: ProtocolSettings,

    #[serde(default)]
    pub workers: WorkerSettings,

    #[serde(default)]
    pub demo: DemoSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.protocol.session_timeout(), Duration::from_secs(300));
        assert_eq!(settings.workers.max_concurrent, 4);
        assert_eq!(settings.demo.recipients.len(), 2);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "protocol": { "session_timeout_secs": 12 } }"#).unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.protocol.session_timeout_secs, 12);
        assert_eq!(settings.workers.max_concurrent, 4);
        assert_eq!(settings.demo.calculator, "calculator@localhost:55000");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.demo.work_millis = 10;
        save_settings(&settings, &path).unwrap();

        let loaded = load_settings_from(&path).unwrap();
        assert_eq!(loaded.demo.work_millis, 10);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_settings_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = Settings::default();
        settings.protocol.session_timeout_secs = 0;
        assert!(validate_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.demo.recipients = vec!["not an agent".to_string()];
        assert!(validate_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.demo.recipients = vec![settings.demo.calculator.clone()];
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(load_settings_from(&path), Err(Error::Json(_))));
    }
}
