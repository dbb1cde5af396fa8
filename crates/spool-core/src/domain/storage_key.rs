//! Record file names.
//!
//! A record lives at `<root>/<storage key>`, where the key is
//! `<local timestamp>_<task id>` with the timestamp laid out as
//! `YYYY-MM-DDTHH-MM-SS`. Anything in the queue directory that does not match
//! this shape, or starts with a dot, is not a record.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::TaskId;

/// `strftime` layout of the timestamp half of a storage key.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

static RECORD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}-[0-9]{2}-[0-9]{2}_[0-9a-fA-F-]{36}$")
        .expect("record name pattern is valid")
});

/// Deterministic file identity of a record, fixed once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new<Tz>(created_at: &DateTime<Tz>, id: TaskId) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self(format!("{}_{}", created_at.format(TIMESTAMP_FORMAT), id))
    }

    /// Accept an existing file name as a key if it follows the naming convention.
    pub fn parse(name: &str) -> Option<Self> {
        is_record_name(name).then(|| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// True when `name` is a record file: never hidden, and matching the pattern.
pub fn is_record_name(name: &str) -> bool {
    !name.starts_with('.') && RECORD_NAME.is_match(name)
}
