//! Domain model types used throughout uidsync.
//!
//! Everything here is rebuilt from the two sources of truth on each run and
//! discarded at exit.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Entity kind
// ---------------------------------------------------------------------------

/// Whether a record describes a user account or a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Group => write!(f, "group"),
        }
    }
}

// ---------------------------------------------------------------------------
// Local snapshot
// ---------------------------------------------------------------------------

/// A user record parsed from a passwd-format file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalIdentity {
    pub name: String,
    pub uid: u32,
    /// Primary group ID.
    pub gid: u32,
}

/// A group record parsed from a group-format file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalGroup {
    pub name: String,
    pub gid: u32,
    /// Supplementary members listed explicitly in the record.
    pub members: BTreeSet<String>,
}

/// Local identity state at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalSnapshot {
    pub users: Vec<LocalIdentity>,
    pub groups: Vec<LocalGroup>,
}

// ---------------------------------------------------------------------------
// Remote snapshot
// ---------------------------------------------------------------------------

/// A user as listed by the remote directory. The `uid` is the desired value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteIdentity {
    #[serde(rename = "username")]
    pub name: String,
    pub uid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

/// A group as listed by the remote directory. The `gid` is the desired value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteGroup {
    pub name: String,
    pub gid: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

/// Remote identity state at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub users: Vec<RemoteIdentity>,
    pub groups: Vec<RemoteGroup>,
}

// ---------------------------------------------------------------------------
// Reconciliation output
// ---------------------------------------------------------------------------

/// The record that a named entity's numeric ID differs between sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdRemapping {
    pub kind: EntityKind,
    pub name: String,
    pub old_id: u32,
    pub new_id: u32,
}

// ---------------------------------------------------------------------------
// Ownership report
// ---------------------------------------------------------------------------

/// Filesystem entries owned by one remapped entity's old ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnershipEntry {
    pub kind: EntityKind,
    pub name: String,
    pub old_id: u32,
    pub new_id: u32,
    /// Affected paths in traversal order.
    #[serde(serialize_with = "serialize_paths_lossy")]
    pub paths: Vec<PathBuf>,
}

/// Non-UTF-8 bytes in a file name become U+FFFD.
fn serialize_paths_lossy<S: Serializer>(paths: &[PathBuf], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(paths.iter().map(|p| p.to_string_lossy()))
}

impl OwnershipEntry {
    pub fn from_remapping(remap: &IdRemapping) -> Self {
        Self {
            kind: remap.kind,
            name: remap.name.clone(),
            old_id: remap.old_id,
            new_id: remap.new_id,
            paths: Vec::new(),
        }
    }
}

/// Counters collected during the filesystem walk.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanStats {
    /// Entries whose metadata was read.
    pub visited: u64,
    /// Entries that matched at least one remapping.
    pub matched: u64,
    /// Entries or directories that could not be read.
    pub unreadable: u64,
}

/// Affected paths per old ID, split by entity kind.
///
/// A UID and a GID may share a numeric value, so users and groups are keyed
/// separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnershipReport {
    pub users: BTreeMap<u32, OwnershipEntry>,
    pub groups: BTreeMap<u32, OwnershipEntry>,
    pub stats: ScanStats,
}

impl OwnershipReport {
    /// Lookup by kind and old ID.
    pub fn get(&self, kind: EntityKind, old_id: u32) -> Option<&OwnershipEntry> {
        match kind {
            EntityKind::User => self.users.get(&old_id),
            EntityKind::Group => self.groups.get(&old_id),
        }
    }

    /// All entries, users first, each ordered by old ID.
    pub fn entries(&self) -> impl Iterator<Item = &OwnershipEntry> {
        self.users.values().chain(self.groups.values())
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }

    /// Total number of affected paths across all entries.
    pub fn path_count(&self) -> usize {
        self.entries().map(|e| e.paths.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// States of a single reconciliation run. Transitions only move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Loading,
    Reconciling,
    Scanning,
    ReportOnly,
    AwaitingConfirmation,
    Applying,
    Done,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Reconciling => write!(f, "reconciling"),
            Self::Scanning => write!(f, "scanning"),
            Self::ReportOnly => write!(f, "report_only"),
            Self::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            Self::Applying => write!(f, "applying"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
