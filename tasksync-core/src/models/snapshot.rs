use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Task;

/// The last fully-synced copy of a task, replaced wholesale on every pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub task: Task,
    pub synced_at: DateTime<Utc>,
}
