//! Typed structural comparison over the fields that matter for
//! classification.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Due, Task};

/// The fixed comparison set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Content,
    Description,
    ProjectId,
    Priority,
    Labels,
    Due,
    ParentId,
    IsCompleted,
}

impl TrackedField {
    pub const ALL: [TrackedField; 8] = [
        Self::Content,
        Self::Description,
        Self::ProjectId,
        Self::Priority,
        Self::Labels,
        Self::Due,
        Self::ParentId,
        Self::IsCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Description => "description",
            Self::ProjectId => "project_id",
            Self::Priority => "priority",
            Self::Labels => "labels",
            Self::Due => "due",
            Self::ParentId => "parent_id",
            Self::IsCompleted => "is_completed",
        }
    }
}

/// A borrowed view of one tracked field. Equality is type-aware: label sets
/// compare as sets, due descriptors structurally, everything else exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    OptionalText(Option<&'a str>),
    Integer(i32),
    Flag(bool),
    Set(BTreeSet<&'a str>),
    Due(Option<&'a Due>),
}

impl FieldValue<'_> {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => json!(s),
            Self::OptionalText(s) => json!(s),
            Self::Integer(n) => json!(n),
            Self::Flag(b) => json!(b),
            Self::Set(items) => json!(items),
            Self::Due(due) => serde_json::to_value(due).unwrap_or(Value::Null),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::OptionalText(s) => *s,
            _ => None,
        }
    }
}

/// Tracked values of a task, in [`TrackedField::ALL`] order.
///
/// The destructuring below lists every `Task` field, so adding one fails to
/// compile until it is either tracked here or explicitly ignored.
pub fn tracked_values(task: &Task) -> [(TrackedField, FieldValue<'_>); 8] {
    let Task {
        id: _,
        content,
        description,
        project_id,
        parent_id,
        priority,
        labels,
        due,
        is_completed,
        completed_at: _,
        created_at: _,
        updated_at: _,
    } = task;

    [
        (TrackedField::Content, FieldValue::Text(content)),
        (
            TrackedField::Description,
            FieldValue::OptionalText(description.as_deref().filter(|d| !d.is_empty())),
        ),
        (TrackedField::ProjectId, FieldValue::Text(project_id)),
        (TrackedField::Priority, FieldValue::Integer(*priority)),
        (
            TrackedField::Labels,
            FieldValue::Set(labels.iter().map(String::as_str).collect()),
        ),
        (TrackedField::Due, FieldValue::Due(due.as_ref())),
        (
            TrackedField::ParentId,
            FieldValue::OptionalText(parent_id.as_deref()),
        ),
        (TrackedField::IsCompleted, FieldValue::Flag(*is_completed)),
    ]
}

/// Fields whose value differs between `current` and `previous`, as
/// `(field, previous, current)`.
pub fn diff_tasks<'a>(
    current: &'a Task,
    previous: &'a Task,
) -> Vec<(TrackedField, FieldValue<'a>, FieldValue<'a>)> {
    tracked_values(previous)
        .into_iter()
        .zip(tracked_values(current))
        .filter_map(|((field, old), (_, new))| (old != new).then_some((field, old, new)))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    fn task() -> Task {
        let now = Utc::now();
        Task {
            id: "t1".into(),
            content: "Write report".into(),
            description: None,
            project_id: "p1".into(),
            parent_id: None,
            priority: 1,
            labels: vec!["a".into(), "b".into()],
            due: None,
            is_completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn label_order_is_ignored() {
        let old = task();
        let mut new = task();
        new.labels = vec!["b".into(), "a".into()];

        assert!(diff_tasks(&new, &old).is_empty());
    }

    #[test]
    fn empty_and_missing_description_are_equal() {
        let old = task();
        let mut new = task();
        new.description = Some(String::new());

        assert!(diff_tasks(&new, &old).is_empty());
    }

    #[test]
    fn due_compares_structurally() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut old = task();
        old.due = Some(Due {
            date,
            time: None,
            string: Some("mar 1".into()),
            timezone: None,
            is_recurring: false,
        });
        let mut new = old.clone();
        assert!(diff_tasks(&new, &old).is_empty());

        new.due.as_mut().unwrap().is_recurring = true;
        let changes = diff_tasks(&new, &old);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, TrackedField::Due);
    }

    #[test]
    fn updated_at_is_not_a_tracked_change() {
        let old = task();
        let mut new = task();
        new.updated_at = old.updated_at + chrono::Duration::hours(1);

        assert!(diff_tasks(&new, &old).is_empty());
    }
}
