//! Apply step: re-number entities and re-own their files.
//!
//! Each entity is handled as a unit. Its numeric ID is changed first, then
//! every reported path is re-owned. If any step fails, paths already touched
//! are restored to the old ID and the ID change is reverted before moving on
//! to the next entity.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::errors::ApplyError;
use crate::models::{EntityKind, OwnershipEntry, OwnershipReport};

/// Platform primitive for changing numeric IDs.
pub trait IdModifier {
    /// Change the numeric ID of the named user or group.
    fn set_entity_id(&mut self, kind: EntityKind, name: &str, new_id: u32) -> Result<(), ApplyError>;

    /// Change the owner (for users) or group (for groups) of `path` without
    /// following symlinks.
    fn set_path_owner(&mut self, kind: EntityKind, path: &Path, id: u32) -> Result<(), ApplyError>;
}

/// [`IdModifier`] backed by `usermod`/`groupmod` and `lchown`.
#[derive(Debug, Default)]
pub struct SystemModifier;

impl IdModifier for SystemModifier {
    fn set_entity_id(&mut self, kind: EntityKind, name: &str, new_id: u32) -> Result<(), ApplyError> {
        let (command, flag) = match kind {
            EntityKind::User => ("usermod", "-u"),
            EntityKind::Group => ("groupmod", "-g"),
        };
        let id = new_id.to_string();
        let output = Command::new(command)
            .args([flag, id.as_str(), name])
            .output()
            .map_err(|e| ApplyError::CommandFailed {
                command: command.into(),
                kind,
                name: name.into(),
                detail: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ApplyError::CommandFailed {
                command: command.into(),
                kind,
                name: name.into(),
                detail: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        info!(command, %kind, name, new_id, "changed numeric ID");
        Ok(())
    }

    fn set_path_owner(&mut self, kind: EntityKind, path: &Path, id: u32) -> Result<(), ApplyError> {
        let (uid, gid) = match kind {
            EntityKind::User => (Some(id), None),
            EntityKind::Group => (None, Some(id)),
        };
        std::os::unix::fs::lchown(path, uid, gid).map_err(|source| ApplyError::Chown {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `usermod`, `groupmod` and `lchown` on foreign files all need root.
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no failure mode.
    unsafe { libc::geteuid() == 0 }
}

/// An entity whose ID and files were updated (or would be, in a dry run).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedEntity {
    pub kind: EntityKind,
    pub name: String,
    pub old_id: u32,
    pub new_id: u32,
    pub paths: usize,
}

/// An entity that could not be updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyFailure {
    pub kind: EntityKind,
    pub name: String,
    pub old_id: u32,
    pub new_id: u32,
    pub error: String,
    /// False when restoring the previous state also failed and the entity
    /// needs manual attention.
    pub rolled_back: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplySummary {
    pub dry_run: bool,
    pub applied: Vec<AppliedEntity>,
    pub failures: Vec<ApplyFailure>,
}

impl ApplySummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply every entry in `report`. With `dry_run` set the modifier is never
/// called and the summary lists what would have been applied.
pub fn apply(report: &OwnershipReport, modifier: &mut dyn IdModifier, dry_run: bool) -> ApplySummary {
    let mut summary = ApplySummary {
        dry_run,
        ..Default::default()
    };

    for entry in report.entries() {
        if dry_run {
            info!(kind = %entry.kind, name = %entry.name, paths = entry.paths.len(), "dry run, not applying");
            summary.applied.push(applied(entry));
            continue;
        }
        match apply_entity(entry, modifier) {
            Ok(()) => summary.applied.push(applied(entry)),
            Err(failure) => summary.failures.push(failure),
        }
    }

    info!(
        applied = summary.applied.len(),
        failed = summary.failures.len(),
        dry_run,
        "apply finished"
    );
    summary
}

fn applied(entry: &OwnershipEntry) -> AppliedEntity {
    AppliedEntity {
        kind: entry.kind,
        name: entry.name.clone(),
        old_id: entry.old_id,
        new_id: entry.new_id,
        paths: entry.paths.len(),
    }
}

fn apply_entity(entry: &OwnershipEntry, modifier: &mut dyn IdModifier) -> Result<(), ApplyFailure> {
    let failure = |err: &ApplyError, rolled_back: bool| ApplyFailure {
        kind: entry.kind,
        name: entry.name.clone(),
        old_id: entry.old_id,
        new_id: entry.new_id,
        error: err.to_string(),
        rolled_back,
    };

    if let Err(err) = modifier.set_entity_id(entry.kind, &entry.name, entry.new_id) {
        error!(kind = %entry.kind, name = %entry.name, error = %err, "failed to change numeric ID");
        return Err(failure(&err, true));
    }

    for (idx, path) in entry.paths.iter().enumerate() {
        if let Err(err) = modifier.set_path_owner(entry.kind, path, entry.new_id) {
            error!(
                kind = %entry.kind,
                name = %entry.name,
                error = %err,
                "re-own failed, rolling back entity"
            );
            let rolled_back = roll_back(entry, &entry.paths[..idx], modifier);
            return Err(failure(&err, rolled_back));
        }
    }

    info!(kind = %entry.kind, name = %entry.name, paths = entry.paths.len(), "entity updated");
    Ok(())
}

/// Restore `touched` to the old ID, then revert the entity's ID. Returns
/// whether every restore step succeeded.
fn roll_back(entry: &OwnershipEntry, touched: &[std::path::PathBuf], modifier: &mut dyn IdModifier) -> bool {
    let mut clean = true;
    for path in touched.iter().rev() {
        if let Err(err) = modifier.set_path_owner(entry.kind, path, entry.old_id) {
            warn!(path = %path.display(), error = %err, "rollback: failed to restore ownership");
            clean = false;
        }
    }
    if let Err(err) = modifier.set_entity_id(entry.kind, &entry.name, entry.old_id) {
        warn!(name = %entry.name, error = %err, "rollback: failed to restore numeric ID");
        clean = false;
    }
    clean
}
