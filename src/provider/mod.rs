//! Remote provider abstraction.
//!
//! The remote provider is the source of truth for task content, projects,
//! labels, due dates and completion. The sync engine only ever talks to it
//! through [`RemoteProvider`].

mod http;

pub use http::HttpProvider;

use async_trait::async_trait;
use tasksync_core::models::{CreateTaskInput, Label, Project, Task, UpdateTaskInput};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("authentication rejected by provider")]
    Unauthorized,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no remote provider configured")]
    Unavailable,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Operations consumed from the remote task service. Retrying is the
/// caller's concern.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, ProviderError>;

    async fn list_projects(&self) -> Result<Vec<Project>, ProviderError>;

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError>;

    async fn create_task(&self, input: &CreateTaskInput) -> Result<Task, ProviderError>;

    /// Apply a field patch. Project moves go through [`Self::move_task`].
    async fn update_task(&self, id: &str, patch: &UpdateTaskInput) -> Result<Task, ProviderError>;

    async fn move_task(&self, id: &str, project_id: &str) -> Result<(), ProviderError>;

    async fn close_task(&self, id: &str) -> Result<(), ProviderError>;

    async fn delete_task(&self, id: &str) -> Result<(), ProviderError>;
}
