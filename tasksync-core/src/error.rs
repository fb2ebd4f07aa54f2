use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Metadata or history was written for a task the store has never seen.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("malformed snapshot for task {task_id}: {source}")]
    MalformedSnapshot {
        task_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("invalid taxonomy: {0}")]
    Taxonomy(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
