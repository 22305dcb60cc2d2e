//! `config.toml` loading and saving.
//!
//! ```toml
//! [monitor]
//! target = "8.8.8.8"
//! interval_secs = 5
//! probe_timeout_secs = 2
//!
//! [storage]
//! data_dir = "./data"
//! max_segment_bytes = 10485760
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use toml::Value;

use crate::error::UplogError;
use crate::services::scheduler::{DEFAULT_INTERVAL, DEFAULT_TARGET, SchedulerConfig};
use crate::storage::{DEFAULT_MAX_SEGMENT_BYTES, StoreConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub target: String,
    pub interval_secs: u64,
    pub probe_timeout_secs: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            interval_secs: DEFAULT_INTERVAL.as_secs(),
            probe_timeout_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub max_segment_bytes: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub storage: StorageSettings,
}

impl Settings {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, UplogError> {
        Self::load_from(&default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, UplogError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| UplogError::at_path("failed to read config", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, UplogError> {
        let root: Value = content.parse::<Value>()?;
        parse_value(&root)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), UplogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UplogError::at_path("failed to create config directory", parent, e))?;
        }
        let serialized = toml::to_string_pretty(&self.to_value())?;
        fs::write(path, serialized)
            .map_err(|e| UplogError::at_path("failed to write config", path, e))?;
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            target: self.monitor.target.clone(),
            interval: Duration::from_secs(self.monitor.interval_secs),
        }
        .normalized()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.monitor.probe_timeout_secs)
            .unwrap_or(Duration::from_secs(2))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.storage.data_dir.clone(),
            max_segment_bytes: self.storage.max_segment_bytes,
        }
    }

    fn to_value(&self) -> Value {
        let mut monitor = toml::map::Map::new();
        monitor.insert("target".into(), Value::String(self.monitor.target.clone()));
        monitor.insert(
            "interval_secs".into(),
            Value::Integer(self.monitor.interval_secs as i64),
        );
        monitor.insert(
            "probe_timeout_secs".into(),
            Value::Float(self.monitor.probe_timeout_secs),
        );

        let mut storage = toml::map::Map::new();
        storage.insert(
            "data_dir".into(),
            Value::String(self.storage.data_dir.to_string_lossy().into_owned()),
        );
        storage.insert(
            "max_segment_bytes".into(),
            Value::Integer(self.storage.max_segment_bytes as i64),
        );

        let mut root = toml::map::Map::new();
        root.insert("monitor".into(), Value::Table(monitor));
        root.insert("storage".into(), Value::Table(storage));
        Value::Table(root)
    }
}

pub fn default_path() -> PathBuf {
    resolve_config_dir().join("config.toml")
}

fn parse_value(root: &Value) -> Result<Settings, UplogError> {
    let mut data = Settings::default();
    if let Some(monitor) = root.get("monitor").and_then(Value::as_table) {
        if let Some(target) = monitor.get("target") {
            data.monitor.target = target
                .as_str()
                .ok_or_else(|| invalid("monitor.target", "a string"))?
                .to_string();
        }
        if let Some(interval) = monitor.get("interval_secs") {
            data.monitor.interval_secs = interval
                .as_integer()
                .and_then(|i| u64::try_from(i).ok())
                .ok_or_else(|| invalid("monitor.interval_secs", "a non-negative integer"))?;
        }
        if let Some(timeout) = monitor.get("probe_timeout_secs") {
            data.monitor.probe_timeout_secs = match timeout {
                Value::Float(f) if *f > 0.0 => *f,
                Value::Integer(i) if *i > 0 => *i as f64,
                _ => return Err(invalid("monitor.probe_timeout_secs", "a positive number")),
            };
        }
    }
    if let Some(storage) = root.get("storage").and_then(Value::as_table) {
        if let Some(dir) = storage.get("data_dir") {
            data.storage.data_dir = PathBuf::from(
                dir.as_str()
                    .ok_or_else(|| invalid("storage.data_dir", "a string"))?,
            );
        }
        if let Some(max) = storage.get("max_segment_bytes") {
            data.storage.max_segment_bytes = max
                .as_integer()
                .and_then(|i| u64::try_from(i).ok())
                .filter(|&b| b > 0)
                .ok_or_else(|| invalid("storage.max_segment_bytes", "a positive integer"))?;
        }
    }
    Ok(data)
}

fn invalid(key: &str, expected: &str) -> UplogError {
    UplogError::Config(format!("`{key}` must be {expected}"))
}

fn resolve_config_dir() -> PathBuf {
    if let Some(val) = env::var_os("UPLOG_CONFIG_DIR") {
        let path = PathBuf::from(val);
        if path.is_absolute() {
            return path;
        }
        return env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| PathBuf::from("."));
    }
    if let Some(base) = dirs::config_dir() {
        return base.join("uplog");
    }
    PathBuf::from(".uplog")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn parses_all_sections() {
        let s = Settings::parse(
            r#"
            [monitor]
            target = "1.1.1.1"
            interval_secs = 30
            probe_timeout_secs = 3

            [storage]
            data_dir = "/var/lib/uplog"
            max_segment_bytes = 4096
            unknown = true
            "#,
        )
        .unwrap();
        assert_eq!(s.monitor.target, "1.1.1.1");
        assert_eq!(s.monitor.interval_secs, 30);
        assert_eq!(s.probe_timeout(), Duration::from_secs(3));
        assert_eq!(s.storage.data_dir, PathBuf::from("/var/lib/uplog"));
        assert_eq!(s.store_config().max_segment_bytes, 4096);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = Settings::parse("[monitor]\ninterval_secs = \"fast\"\n").unwrap_err();
        assert!(matches!(err, UplogError::Config(ref m) if m.contains("interval_secs")));
        assert!(Settings::parse("[storage]\nmax_segment_bytes = 0\n").is_err());
        assert!(Settings::parse("not = [toml").is_err());
    }

    #[test]
    fn scheduler_config_is_normalized() {
        let mut s = Settings::default();
        s.monitor.target = String::new();
        s.monitor.interval_secs = 0;
        let cfg = s.scheduler_config();
        assert_eq!(cfg.target, DEFAULT_TARGET);
        assert_eq!(cfg.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut s = Settings::default();
        s.monitor.target = "example.org".into();
        s.storage.max_segment_bytes = 2048;
        s.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), s);
        assert_eq!(
            Settings::load_from(&dir.path().join("missing.toml")).unwrap(),
            Settings::default()
        );
    }
}
