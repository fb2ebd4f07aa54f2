use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A task as reported by the remote provider (or created locally in
/// standalone mode).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub description: Option<String>,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub priority: i32,
    /// Label identifiers. Order carries no meaning.
    #[serde(default)]
    pub labels: Vec<String>,
    pub due: Option<Due>,
    #[serde(default)]
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Last modification time as supplied by the remote provider.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Due {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    /// Natural-language form, e.g. "every monday".
    pub string: Option<String>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
}

impl Task {
    /// Apply a patch in place. Returns true when any field changed.
    pub fn apply(&mut self, patch: &UpdateTaskInput) -> bool {
        let before = self.clone();

        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(project_id) = &patch.project_id {
            self.project_id = project_id.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(labels) = &patch.labels {
            self.labels = labels.clone();
        }
        if let Some(due) = &patch.due {
            self.due = Some(due.clone());
        }

        *self != before
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub project_id: Option<String>,
    pub label: Option<String>,
    #[serde(default)]
    pub include_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub content: String,
    pub description: Option<String>,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub priority: Option<i32>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub due: Option<Due>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub content: Option<String>,
    pub description: Option<String>,
    pub project_id: Option<String>,
    pub priority: Option<i32>,
    pub labels: Option<Vec<String>>,
    pub due: Option<Due>,
}

impl UpdateTaskInput {
    /// The part of the patch that goes through a plain field update on the
    /// remote side. Moves between projects use a separate call.
    pub fn without_project(&self) -> Self {
        Self {
            project_id: None,
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.description.is_none()
            && self.project_id.is_none()
            && self.priority.is_none()
            && self.labels.is_none()
            && self.due.is_none()
    }
}
