//! tasksync keeps a local, classified mirror of a remote task manager.
//!
//! The remote provider owns task content; this crate pulls it on a schedule,
//! reconciles every task against its last synced snapshot and decides which
//! tasks must be classified again. `tasksync-core` holds the store and the
//! reconciliation logic; this crate adds the provider client, the sync
//! engine and the HTTP and MCP front ends.

pub mod api;
pub mod config;
pub mod mcp;
pub mod provider;
pub mod sync;

pub use config::Config;
pub use sync::{SyncEngine, SyncError, SyncResult};
