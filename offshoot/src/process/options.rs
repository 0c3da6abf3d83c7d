//! Spawn options and the process-wide defaults they are merged over.

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How a unit of work is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Run on the caller's thread before `spawn` returns.
    Inline,
    /// Run in a separate OS process.
    IsolatedProcess,
    /// Run on a dedicated thread in this process.
    ConcurrentTask,
}

impl Strategy {
    /// The strategy used when neither the caller nor the defaults pick one.
    pub const fn platform_default() -> Self {
        if cfg!(unix) {
            Self::IsolatedProcess
        } else {
            Self::ConcurrentTask
        }
    }

    /// Convert to the configuration spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::IsolatedProcess => "isolated_process",
            Self::ConcurrentTask => "concurrent_task",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "inline" => Ok(Self::Inline),
            "isolated_process" | "process" | "fork" => Ok(Self::IsolatedProcess),
            "concurrent_task" | "task" | "thread" => Ok(Self::ConcurrentTask),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

/// Fully resolved options for one spawn call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnOptions {
    /// Execution strategy.
    pub strategy: Strategy,
    /// Niceness hint; applied to the child process or the task thread.
    pub priority_hint: Option<i32>,
    /// Terminate the isolated child when this process shuts down.
    pub kill_on_exit: bool,
    /// Name shown in process listings (isolated) or thread name (task).
    pub display_name: Option<String>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::platform_default(),
            priority_hint: None,
            kill_on_exit: false,
            display_name: None,
        }
    }
}

impl SpawnOptions {
    /// Apply `overrides` field by field, leaving `self` untouched.
    #[must_use]
    pub fn merged(&self, overrides: &OptionOverrides) -> Self {
        Self {
            strategy: overrides.strategy.unwrap_or(self.strategy),
            priority_hint: overrides.priority_hint.or(self.priority_hint),
            kill_on_exit: overrides.kill_on_exit.unwrap_or(self.kill_on_exit),
            display_name: overrides
                .display_name
                .clone()
                .or_else(|| self.display_name.clone()),
        }
    }
}

/// A partial [`SpawnOptions`]: every unset field falls through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_hint: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_on_exit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl OptionOverrides {
    /// No overrides at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the strategy.
    #[must_use]
    pub const fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Override the priority hint.
    #[must_use]
    pub const fn priority_hint(mut self, hint: i32) -> Self {
        self.priority_hint = Some(hint);
        self
    }

    /// Override kill-on-exit.
    #[must_use]
    pub const fn kill_on_exit(mut self, kill: bool) -> Self {
        self.kill_on_exit = Some(kill);
        self
    }

    /// Override the display name.
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Layer `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn layered(mut self, other: &Self) -> Self {
        if other.strategy.is_some() {
            self.strategy = other.strategy;
        }
        if other.priority_hint.is_some() {
            self.priority_hint = other.priority_hint;
        }
        if other.kill_on_exit.is_some() {
            self.kill_on_exit = other.kill_on_exit;
        }
        if other.display_name.is_some() {
            self.display_name.clone_from(&other.display_name);
        }
        self
    }
}

/// How a priority hint maps onto the niceness of a concurrent task's thread.
///
/// Isolated processes always get `niceness = hint`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Thread niceness equals the hint, same as for processes.
    #[default]
    MatchProcess,
    /// Thread niceness is the negated hint.
    Negated,
}

impl TaskPriority {
    /// Niceness to apply to a task thread for `hint`.
    pub const fn niceness(self, hint: i32) -> i32 {
        match self {
            Self::MatchProcess => hint,
            Self::Negated => hint.saturating_neg(),
        }
    }
}

/// Process-wide defaults, read on every spawn and changed only by `set`.
#[derive(Debug, Default)]
pub struct SpawnDefaults {
    current: RwLock<SpawnOptions>,
}

impl SpawnDefaults {
    /// Start from explicit defaults.
    pub fn new(initial: SpawnOptions) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Merge `overrides` into the defaults.
    pub fn set(&self, overrides: &OptionOverrides) {
        let mut current = self.current.write();
        *current = current.merged(overrides);
    }

    /// Copy of the current defaults.
    pub fn snapshot(&self) -> SpawnOptions {
        self.current.read().clone()
    }

    /// Options for a single call: `overrides` over the current defaults.
    pub fn resolve(&self, overrides: &OptionOverrides) -> SpawnOptions {
        self.current.read().merged(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_fall_through() {
        let defaults = SpawnOptions {
            strategy: Strategy::ConcurrentTask,
            priority_hint: Some(5),
            kill_on_exit: true,
            display_name: Some("worker".to_string()),
        };

        let merged = defaults.merged(&OptionOverrides::new().strategy(Strategy::Inline));
        assert_eq!(merged.strategy, Strategy::Inline);
        assert_eq!(merged.priority_hint, Some(5));
        assert!(merged.kill_on_exit);
        assert_eq!(merged.display_name.as_deref(), Some("worker"));
    }

    #[test]
    fn test_per_call_override_leaves_defaults_alone() {
        let defaults = SpawnDefaults::default();
        let before = defaults.snapshot();

        let resolved = defaults.resolve(
            &OptionOverrides::new()
                .kill_on_exit(true)
                .priority_hint(-3)
                .display_name("reporter"),
        );

        assert!(resolved.kill_on_exit);
        assert_eq!(resolved.priority_hint, Some(-3));
        assert_eq!(defaults.snapshot(), before);
    }

    #[test]
    fn test_set_defaults_merges() {
        let defaults = SpawnDefaults::default();
        defaults.set(&OptionOverrides::new().strategy(Strategy::ConcurrentTask));
        defaults.set(&OptionOverrides::new().priority_hint(10));

        let current = defaults.snapshot();
        assert_eq!(current.strategy, Strategy::ConcurrentTask);
        assert_eq!(current.priority_hint, Some(10));
        assert!(!current.kill_on_exit);
    }

    #[test]
    fn test_platform_default() {
        let options = SpawnOptions::default();
        if cfg!(unix) {
            assert_eq!(options.strategy, Strategy::IsolatedProcess);
        } else {
            assert_eq!(options.strategy, Strategy::ConcurrentTask);
        }
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("inline".parse::<Strategy>(), Ok(Strategy::Inline));
        assert_eq!(
            "isolated-process".parse::<Strategy>(),
            Ok(Strategy::IsolatedProcess)
        );
        assert_eq!("Task".parse::<Strategy>(), Ok(Strategy::ConcurrentTask));
        assert!("cluster".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_layered_overrides() {
        let file = OptionOverrides::new().strategy(Strategy::Inline).priority_hint(4);
        let env = OptionOverrides::new().priority_hint(7);

        let combined = file.layered(&env);
        assert_eq!(combined.strategy, Some(Strategy::Inline));
        assert_eq!(combined.priority_hint, Some(7));
        assert_eq!(combined.kill_on_exit, None);
    }

    #[test]
    fn test_task_priority_sign() {
        assert_eq!(TaskPriority::MatchProcess.niceness(10), 10);
        assert_eq!(TaskPriority::Negated.niceness(10), -10);
    }

    #[test]
    fn test_overrides_from_toml() {
        let overrides: OptionOverrides =
            toml::from_str("strategy = \"concurrent_task\"\nkill_on_exit = true\n").unwrap();
        assert_eq!(overrides.strategy, Some(Strategy::ConcurrentTask));
        assert_eq!(overrides.kill_on_exit, Some(true));
        assert_eq!(overrides.priority_hint, None);
    }
}
