//! Configuration for the `offshoot` binary.
//!
//! Sources, highest precedence first:
//! 1. CLI flags
//! 2. Environment variables (`OFFSHOOT_*`)
//! 3. Configuration file (TOML)
//! 4. Built-in defaults

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::process::{OptionOverrides, Strategy, TaskPriority};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "OFFSHOOT_CONFIG";

/// Accepted priority hints, in niceness units.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = -20..=19;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffshootConfig {
    pub spawn: SpawnSettings,
    pub logging: LoggingSettings,
}

/// Defaults applied to every spawn. Unset fields fall through to the
/// platform defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_hint: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_on_exit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Sign convention for priority hints on concurrent tasks.
    pub task_priority: TaskPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Also log to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

impl SpawnSettings {
    /// The settings as overrides for `Spawner::set_defaults`.
    pub fn overrides(&self) -> OptionOverrides {
        OptionOverrides {
            strategy: self.strategy,
            priority_hint: self.priority_hint,
            kill_on_exit: self.kill_on_exit,
            display_name: self.display_name.clone(),
        }
    }
}

impl OffshootConfig {
    /// Load from `path` (or the usual locations) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load using `env` to look up environment variables.
    pub fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match Self::find_config_file(path, &env)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading configuration file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("offshoot").join("config.toml"))
    }

    fn find_config_file(
        explicit: Option<&Path>,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<Option<PathBuf>> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_ENV).map(PathBuf::from));
        if let Some(path) = named {
            if !path.exists() {
                bail!("configuration file not found: {}", path.display());
            }
            return Ok(Some(path));
        }
        Ok(Self::default_path().filter(|path| path.exists()))
    }

    fn apply_env_overrides(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = env("OFFSHOOT_STRATEGY") {
            let strategy = val
                .parse::<Strategy>()
                .map_err(|e| anyhow::anyhow!("OFFSHOOT_STRATEGY: {e}"))?;
            self.spawn.strategy = Some(strategy);
        }
        if let Some(val) = env("OFFSHOOT_PRIORITY_HINT") {
            let hint = val
                .trim()
                .parse()
                .with_context(|| format!("OFFSHOOT_PRIORITY_HINT: '{val}' is not an integer"))?;
            self.spawn.priority_hint = Some(hint);
        }
        if let Some(val) = env("OFFSHOOT_KILL_ON_EXIT") {
            self.spawn.kill_on_exit = Some(parse_bool(&val).context("OFFSHOOT_KILL_ON_EXIT")?);
        }
        if let Some(val) = env("OFFSHOOT_DISPLAY_NAME") {
            self.spawn.display_name = Some(val);
        }
        Ok(())
    }

    /// Reject values no spawn could use.
    pub fn validate(&self) -> Result<()> {
        if let Some(hint) = self.spawn.priority_hint {
            if !PRIORITY_RANGE.contains(&hint) {
                bail!(
                    "priority_hint {hint} is outside {}..={}",
                    PRIORITY_RANGE.start(),
                    PRIORITY_RANGE.end()
                );
            }
        }
        if self
            .spawn
            .display_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            bail!("display_name must not be empty");
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

fn parse_bool(val: &str) -> Result<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("'{other}' is not a boolean"),
    }
}
