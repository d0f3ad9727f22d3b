//! Sorter configuration stored under `<data_dir>/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Sorter configuration (TOML).
///
/// Missing fields default to the values the deployed device uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SorterConfig {
    /// SQLite database file, relative to the data directory.
    pub database_file: PathBuf,

    /// Run-state JSON file, relative to the data directory.
    pub run_state_file: PathBuf,

    /// How long a write waits on a locked database before failing.
    pub busy_timeout_ms: u64,

    /// What `POST control` does with commands it does not recognize.
    pub unknown_commands: CommandPolicy,

    pub metrics: MetricsConfig,
}

/// Handling of unrecognized control commands.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandPolicy {
    /// Echo current state back, flagged as degraded.
    #[default]
    Ignore,
    /// Refuse the command with an error; state is not touched.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Mount point whose usage is reported as storage.
    pub disk_mount: PathBuf,
    /// Thermal zone file holding the CPU temperature in millidegrees.
    pub thermal_zone: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            disk_mount: PathBuf::from("/"),
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
        }
    }
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            database_file: PathBuf::from("cacao_database.db"),
            run_state_file: PathBuf::from("run_state.json"),
            busy_timeout_ms: 5_000,
            unknown_commands: CommandPolicy::Ignore,
            metrics: MetricsConfig::default(),
        }
    }
}

impl SorterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.busy_timeout_ms == 0 {
            return Err(anyhow!("busy_timeout_ms must be > 0"));
        }
        if self.database_file.as_os_str().is_empty() {
            return Err(anyhow!("database_file must not be empty"));
        }
        if self.run_state_file.as_os_str().is_empty() {
            return Err(anyhow!("run_state_file must not be empty"));
        }
        if self.metrics.disk_mount.as_os_str().is_empty() {
            return Err(anyhow!("metrics.disk_mount must not be empty"));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Resolved file locations for one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SorterPaths {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub database_path: PathBuf,
    pub run_state_path: PathBuf,
}

impl SorterPaths {
    pub fn new(data_dir: &Path, cfg: &SorterConfig) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            config_path: data_dir.join(CONFIG_FILE),
            database_path: data_dir.join(&cfg.database_file),
            run_state_path: data_dir.join(&cfg.run_state_file),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SorterConfig::default()`.
pub fn load_config(path: &Path) -> Result<SorterConfig> {
    if !path.exists() {
        let cfg = SorterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SorterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SorterConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SorterConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        let cfg = SorterConfig {
            busy_timeout_ms: 250,
            unknown_commands: CommandPolicy::Reject,
            ..SorterConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "unknown_commands = \"reject\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.unknown_commands, CommandPolicy::Reject);
        assert_eq!(cfg.busy_timeout_ms, 5_000);
    }

    #[test]
    fn zero_busy_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "busy_timeout_ms = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("busy_timeout_ms"));
    }
}
