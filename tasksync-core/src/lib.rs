//! Core library for tasksync.
//!
//! This crate provides the domain models, the snapshot/metadata store and the
//! reconciliation engine, independent of any transport layer or remote
//! provider.
//!
//! # Usage
//!
//! ```no_run
//! use tasksync_core::db::Database;
//! use tasksync_core::reconcile::detect_changes;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! for task in db.get_tasks(&Default::default())? {
//!     let metadata = db.get_task_metadata(&task.id)?;
//!     let snapshot = db.get_last_synced_state(&task.id)?;
//!     let analysis = detect_changes(&task, metadata.as_ref(), snapshot.as_ref());
//!     println!("{}: {}", task.id, analysis.reason);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod taxonomy;

// Re-export commonly used types at crate root
pub use db::Database;
pub use error::{Error, Result};
pub use taxonomy::{Taxonomy, TaxonomyHandle};
