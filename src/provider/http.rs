use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tasksync_core::models::{CreateTaskInput, Due, Label, Project, Task, UpdateTaskInput};

use super::{ProviderError, RemoteProvider};

const MAX_ERROR_BODY: usize = 300;

/// REST client for a Todoist-style task API.
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpProvider {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ProviderError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        check(response).await
    }
}

#[async_trait]
impl RemoteProvider for HttpProvider {
    async fn list_tasks(&self) -> Result<Vec<Task>, ProviderError> {
        let raw: Vec<serde_json::Value> = self.get_json("tasks").await?;
        Ok(convert_tasks(raw))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ProviderError> {
        let projects: Vec<RemoteProject> = self.get_json("projects").await?;
        Ok(projects.into_iter().map(Into::into).collect())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError> {
        let labels: Vec<RemoteLabel> = self.get_json("labels").await?;
        Ok(labels.into_iter().map(Into::into).collect())
    }

    async fn create_task(&self, input: &CreateTaskInput) -> Result<Task, ProviderError> {
        let body = TaskWriteRequest {
            content: Some(&input.content),
            description: input.description.as_deref(),
            project_id: Some(&input.project_id),
            parent_id: input.parent_id.as_deref(),
            priority: input.priority,
            labels: Some(&input.labels),
            due_string: due_string(input.due.as_ref()),
            due_date: input.due.as_ref().map(|d| d.date.to_string()),
        };
        let task: RemoteTask = self.post_json("tasks", &body).await?.json().await?;
        task.into_task()
    }

    async fn update_task(&self, id: &str, patch: &UpdateTaskInput) -> Result<Task, ProviderError> {
        let body = TaskWriteRequest {
            content: patch.content.as_deref(),
            description: patch.description.as_deref(),
            project_id: None,
            parent_id: None,
            priority: patch.priority,
            labels: patch.labels.as_ref(),
            due_string: due_string(patch.due.as_ref()),
            due_date: patch.due.as_ref().map(|d| d.date.to_string()),
        };
        let task: RemoteTask = self
            .post_json(&format!("tasks/{}", id), &body)
            .await?
            .json()
            .await?;
        task.into_task()
    }

    async fn move_task(&self, id: &str, project_id: &str) -> Result<(), ProviderError> {
        self.post_json(
            &format!("tasks/{}/move", id),
            &serde_json::json!({ "project_id": project_id }),
        )
        .await?;
        Ok(())
    }

    async fn close_task(&self, id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.url(&format!("tasks/{}/close", id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.url(&format!("tasks/{}", id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(body.trim()),
            })
        }
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_BODY {
        return message.to_string();
    }
    let mut out: String = message.chars().take(MAX_ERROR_BODY).collect();
    out.push('…');
    out
}

/// Convert each task on its own; a malformed entry is logged and skipped so
/// the rest of the listing still syncs.
fn convert_tasks(raw: Vec<serde_json::Value>) -> Vec<Task> {
    raw.into_iter()
        .filter_map(|value| {
            let task_id = value
                .get("id")
                .and_then(|id| id.as_str())
                .unwrap_or("<unknown>")
                .to_string();
            let converted = serde_json::from_value::<RemoteTask>(value)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
                .and_then(RemoteTask::into_task);
            match converted {
                Ok(task) => Some(task),
                Err(error) => {
                    tracing::warn!(%task_id, %error, "Skipping malformed remote task");
                    None
                }
            }
        })
        .collect()
}

fn due_string(due: Option<&Due>) -> Option<&str> {
    due.and_then(|d| d.string.as_deref())
}

// ============================================================
// Wire types
// ============================================================

#[derive(Serialize)]
struct TaskWriteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_string: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
}

#[derive(Deserialize)]
struct RemoteTask {
    id: String,
    content: String,
    #[serde(default)]
    description: String,
    project_id: String,
    parent_id: Option<String>,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default)]
    labels: Vec<String>,
    due: Option<RemoteDue>,
    #[serde(default)]
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RemoteDue {
    date: String,
    datetime: Option<String>,
    string: Option<String>,
    timezone: Option<String>,
    #[serde(default)]
    is_recurring: bool,
}

#[derive(Deserialize)]
struct RemoteProject {
    id: String,
    name: String,
    parent_id: Option<String>,
    color: Option<String>,
    #[serde(default)]
    is_inbox_project: bool,
}

#[derive(Deserialize)]
struct RemoteLabel {
    id: String,
    name: String,
    color: Option<String>,
}

fn default_priority() -> i32 {
    1
}

impl RemoteTask {
    fn into_task(self) -> Result<Task, ProviderError> {
        let due = self.due.map(RemoteDue::into_due).transpose()?;
        if self.updated_at.is_none() {
            tracing::debug!(task_id = %self.id, "Provider omitted updated_at; using created_at");
        }

        Ok(Task {
            description: (!self.description.is_empty()).then_some(self.description),
            updated_at: self.updated_at.unwrap_or(self.created_at),
            id: self.id,
            content: self.content,
            project_id: self.project_id,
            parent_id: self.parent_id,
            priority: self.priority,
            labels: self.labels,
            due,
            is_completed: self.is_completed,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}

impl RemoteDue {
    fn into_due(self) -> Result<Due, ProviderError> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| ProviderError::InvalidResponse(format!("due date '{}': {}", self.date, e)))?;
        let time = self.datetime.as_deref().and_then(parse_time_of_day);

        Ok(Due {
            date,
            time,
            string: self.string,
            timezone: self.timezone,
            is_recurring: self.is_recurring,
        })
    }
}

/// Accepts both RFC 3339 and floating (zone-less) datetimes.
fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.time())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
                .map(|dt| dt.time())
                .ok()
        })
}

impl From<RemoteProject> for Project {
    fn from(p: RemoteProject) -> Self {
        Self {
            id: p.id,
            name: p.name,
            parent_id: p.parent_id,
            color: p.color,
            is_inbox: p.is_inbox_project,
        }
    }
}

impl From<RemoteLabel> for Label {
    fn from(l: RemoteLabel) -> Self {
        Self {
            id: l.id,
            name: l.name,
            color: l.color,
        }
    }
}
