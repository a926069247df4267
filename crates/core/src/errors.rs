//! Error types for the uidsync core library.
//!
//! Each pipeline stage has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{EntityKind, RunState};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pipeline step was called out of order.
    #[error("cannot {action} while {state}")]
    InvalidState { action: &'static str, state: RunState },

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// Remote directory errors
// ---------------------------------------------------------------------------

/// Errors from the remote directory API. Every variant is fatal for a run.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport failure, timeout, or an undecodable body.
    #[error("remote directory unavailable ({endpoint}): {detail}")]
    Unavailable { endpoint: String, detail: String },

    /// The API answered with a non-success status code.
    #[error("remote directory unavailable ({endpoint}): HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// No API token was supplied on the command line or via the environment.
    #[error("no API key provided (pass --api-key or set ${env_var})")]
    MissingApiKey { env_var: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl RemoteError {
    /// Map a `reqwest` error into [`RemoteError::Unavailable`], keeping the
    /// endpoint that failed.
    pub fn unavailable(endpoint: &str, err: reqwest::Error) -> Self {
        let detail = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Unavailable {
            endpoint: endpoint.to_string(),
            detail,
        }
    }
}

// ---------------------------------------------------------------------------
// Local snapshot errors
// ---------------------------------------------------------------------------

/// Errors while reading local account and group files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A record had too few fields or a non-numeric ID.
    #[error("malformed record in {} line {line}: {detail}", path.display())]
    MalformedLocalRecord {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// Errors from cross-referencing local and remote snapshots.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The remote listing contains the same name more than once.
    #[error("remote directory lists {kind} '{name}' {count} times; refusing to guess")]
    AmbiguousRemoteMatch {
        kind: EntityKind,
        name: String,
        count: usize,
    },

    /// Two local entities of the same kind share an old ID but map to
    /// different remote entities, so file ownership cannot be attributed.
    #[error("local {kind}s {names:?} share ID {old_id}; cannot attribute file ownership")]
    SharedLocalId {
        kind: EntityKind,
        old_id: u32,
        names: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Scan errors
// ---------------------------------------------------------------------------

/// Fatal errors from the ownership scanner. Per-entry read failures are not
/// errors; they are counted in the scan statistics.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan root is missing or not a directory.
    #[error("scan root '{}' is not a readable directory: {detail}", path.display())]
    InvalidRoot { path: PathBuf, detail: String },
}

// ---------------------------------------------------------------------------
// Apply errors
// ---------------------------------------------------------------------------

/// Errors raised by the numeric-ID modification primitive.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// `usermod` / `groupmod` could not be spawned or exited non-zero.
    #[error("{command} failed for {kind} '{name}': {detail}")]
    CommandFailed {
        command: String,
        kind: EntityKind,
        name: String,
        detail: String,
    },

    /// Re-owning a path failed.
    #[error("failed to change ownership of '{}': {source}", path.display())]
    Chown {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = SnapshotError::MalformedLocalRecord {
            path: PathBuf::from("/etc/passwd"),
            line: 7,
            detail: "expected at least 4 fields, found 2".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed record in /etc/passwd line 7: expected at least 4 fields, found 2"
        );

        let err = ReconcileError::AmbiguousRemoteMatch {
            kind: EntityKind::Group,
            name: "devs".into(),
            count: 2,
        };
        assert!(err.to_string().contains("group 'devs' 2 times"));

        let err = RemoteError::Status {
            endpoint: "users/".into(),
            status: 500,
            body: "boom".into(),
        };
        assert!(err.to_string().contains("HTTP 500"));

        let err = RemoteError::MissingApiKey {
            env_var: "UIDSYNC_API_KEY".into(),
        };
        assert!(err.to_string().contains("$UIDSYNC_API_KEY"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err = ScanError::InvalidRoot {
            path: PathBuf::from("/nope"),
            detail: "not found".into(),
        };
        let core_err: CoreError = err.into();
        assert!(matches!(core_err, CoreError::Scan(_)));

        let err = RemoteError::Client("tls".into());
        let core_err: CoreError = err.into();
        assert!(matches!(core_err, CoreError::Remote(_)));
    }
}
