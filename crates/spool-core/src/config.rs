//! File worker configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::QueueName;
use crate::error::SpoolError;

/// Settings of the file-backed worker.
///
/// ```toml
/// path = "storage/queue"
/// max_retry = 3
/// check_interval_secs = 5
/// task_sleep_secs = 0.5
/// timezone = "Asia/Tehran"
///
/// [priorities]
/// critical = 5
/// default = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWorkerConfig {
    /// Queue directory. Relative paths resolve against the working directory.
    pub path: String,

    /// Failed attempts a task may accumulate before it is dropped.
    pub max_retry: u32,

    /// Pause between scan cycles; 0 starts the next cycle immediately.
    pub check_interval_secs: u64,

    /// Pause between two tasks of the same queue within a cycle.
    pub task_sleep_secs: f64,

    /// Queue name to the number of tasks one cycle may take from it.
    pub priorities: BTreeMap<String, usize>,

    /// IANA zone used for record timestamps and storage keys.
    pub timezone: String,

    /// Quarantine directory for records that cannot be processed. When unset,
    /// such records are only logged.
    pub dead_letter_dir: Option<String>,
}

impl Default for FileWorkerConfig {
    fn default() -> Self {
        Self {
            path: "storage/queue".to_string(),
            max_retry: 3,
            check_interval_secs: 5,
            task_sleep_secs: 0.0,
            priorities: BTreeMap::from([(QueueName::DEFAULT.to_string(), 10)]),
            timezone: "UTC".to_string(),
            dead_letter_dir: None,
        }
    }
}

impl FileWorkerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, SpoolError> {
        let config: Self = toml::from_str(text).map_err(|e| SpoolError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SpoolError> {
        let text = std::fs::read_to_string(path).map_err(|e| SpoolError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Decode from an already parsed TOML value (driver settings table).
    pub fn from_toml_value(value: toml::Value) -> Result<Self, SpoolError> {
        let config: Self = value
            .try_into()
            .map_err(|e: toml::de::Error| SpoolError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SpoolError> {
        if self.path.trim().is_empty() {
            return Err(SpoolError::Config("path must not be empty".into()));
        }
        if self.priorities.is_empty() {
            return Err(SpoolError::Config(
                "priorities must name at least one queue".into(),
            ));
        }
        if let Some((queue, _)) = self.priorities.iter().find(|(_, capacity)| **capacity == 0) {
            return Err(SpoolError::Config(format!(
                "queue `{queue}` must have a capacity of at least 1"
            )));
        }
        if Duration::try_from_secs_f64(self.task_sleep_secs).is_err() {
            return Err(SpoolError::Config(format!(
                "task_sleep_secs must be a non-negative duration in range, got {}",
                self.task_sleep_secs
            )));
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, SpoolError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| SpoolError::Config(format!("unknown timezone `{}`", self.timezone)))
    }

    /// Queue directory as an absolute path.
    pub fn root_path(&self) -> Result<PathBuf, SpoolError> {
        let path = PathBuf::from(&self.path);
        if path.is_absolute() {
            return Ok(path);
        }
        let cwd = std::env::current_dir().map_err(|e| SpoolError::io(".", e))?;
        Ok(cwd.join(path))
    }

    pub fn dead_letter_path(&self, root: &Path) -> Option<PathBuf> {
        self.dead_letter_dir.as_ref().map(|dir| root.join(dir))
    }

    pub fn capacities(&self) -> BTreeMap<QueueName, usize> {
        self.priorities
            .iter()
            .map(|(queue, capacity)| (QueueName::new(queue.clone()), *capacity))
            .collect()
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Out-of-range values, which `validate` rejects, read as no pause.
    pub fn task_sleep(&self) -> Duration {
        Duration::try_from_secs_f64(self.task_sleep_secs).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = FileWorkerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.capacities().get(&QueueName::default()), Some(&10));
        assert_eq!(config.timezone().unwrap(), Tz::UTC);
    }

    #[test]
    fn parses_toml_with_partial_fields() {
        let config = FileWorkerConfig::from_toml_str(
            r#"
            path = "/var/spool/app"
            max_retry = 2
            task_sleep_secs = 0.25
            timezone = "Asia/Tehran"
            dead_letter_dir = ".dead"

            [priorities]
            critical = 2
            default = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.max_retry, 2);
        assert_eq!(config.check_interval(), Duration::from_secs(5));
        assert_eq!(config.task_sleep(), Duration::from_millis(250));
        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Tehran);
        assert_eq!(config.root_path().unwrap(), PathBuf::from("/var/spool/app"));
        assert_eq!(
            config.dead_letter_path(Path::new("/var/spool/app")),
            Some(PathBuf::from("/var/spool/app/.dead"))
        );
        assert_eq!(config.capacities().len(), 2);
    }

    #[test]
    fn relative_path_is_joined_to_working_directory() {
        let config = FileWorkerConfig::default();
        let root = config.root_path().unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("storage/queue"));
    }

    #[test]
    fn huge_sleep_never_panics() {
        let config = FileWorkerConfig {
            task_sleep_secs: 1e30,
            ..FileWorkerConfig::default()
        };
        assert!(matches!(config.validate(), Err(SpoolError::Config(_))));
        assert_eq!(config.task_sleep(), Duration::ZERO);
    }

    #[rstest]
    #[case::empty_path(r#"path = """#)]
    #[case::bad_timezone(r#"timezone = "Mars/Olympus""#)]
    #[case::negative_sleep("task_sleep_secs = -1.0")]
    #[case::huge_sleep("task_sleep_secs = 1e30")]
    #[case::nan_sleep("task_sleep_secs = nan")]
    #[case::zero_capacity("[priorities]\ndefault = 0")]
    #[case::no_queues("priorities = {}")]
    #[case::wrong_type(r#"max_retry = "three""#)]
    fn rejects_invalid_config(#[case] text: &str) {
        let result = FileWorkerConfig::from_toml_str(text);
        assert!(matches!(result, Err(SpoolError::Config(_))), "{text}");
    }
}
