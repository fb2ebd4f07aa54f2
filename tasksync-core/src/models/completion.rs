use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub id: Uuid,
    pub task_id: String,
    pub content: String,
    /// Category the task carried when it was closed.
    pub category: Option<String>,
    pub actual_minutes: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteTaskInput {
    pub actual_minutes: Option<i64>,
}
