//! uidsync core library.
//!
//! Reconciles local POSIX account state against a remote directory API:
//! snapshot loading, UID/GID reconciliation, the ownership scan, the apply
//! step with per-entity rollback, and the run pipeline tying them together.

pub mod apply;
pub mod config;
pub mod directory;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod scanner;
pub mod snapshot;

// Re-exports for convenience.
pub use apply::{ApplySummary, IdModifier, SystemModifier};
pub use config::SyncConfig;
pub use directory::DirectoryClient;
pub use errors::CoreError;
pub use pipeline::SyncPipeline;
pub use snapshot::MembershipView;
