//! Ownership remediation scanner.
//!
//! One depth-first walk under the scan root classifies every entry against
//! both the user and the group remappings. Entries below the root are read
//! without following symlinks, so a symlink is judged by its own owner and
//! symlinked directories are never descended into. A root that is itself a
//! symlink to a directory is followed. Directory entries are visited in
//! file-name order, which keeps the report stable on an unchanged tree.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::ScanError;
use crate::models::{EntityKind, IdRemapping, OwnershipEntry, OwnershipReport};

/// Walk behaviour knobs.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Do not descend into directories on a different device than the root.
    pub one_file_system: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            one_file_system: true,
        }
    }
}

/// Scan `root` for entries owned by any remapped old ID.
///
/// Every remapping appears in the report, with an empty path list when
/// nothing under `root` matched. With no remappings the tree is not walked.
pub fn scan(
    root: &Path,
    remappings: &[IdRemapping],
    options: ScanOptions,
) -> Result<OwnershipReport, ScanError> {
    let root_meta = fs::metadata(root).map_err(|e| ScanError::InvalidRoot {
        path: root.to_path_buf(),
        detail: e.to_string(),
    })?;
    if !root_meta.is_dir() {
        return Err(ScanError::InvalidRoot {
            path: root.to_path_buf(),
            detail: "not a directory".into(),
        });
    }

    let mut report = OwnershipReport::default();
    if remappings.is_empty() {
        info!(root = %root.display(), "no remappings, skipping scan");
        return Ok(report);
    }
    for remap in remappings {
        let entry = OwnershipEntry::from_remapping(remap);
        match remap.kind {
            EntityKind::User => report.users.insert(remap.old_id, entry),
            EntityKind::Group => report.groups.insert(remap.old_id, entry),
        };
    }

    info!(
        root = %root.display(),
        users = report.users.len(),
        groups = report.groups.len(),
        one_file_system = options.one_file_system,
        "scanning for owned files"
    );

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .same_file_system(options.one_file_system)
        .sort_by_file_name();

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    path = %e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    error = %e,
                    "failed to read directory"
                );
                report.stats.unreadable += 1;
                continue;
            }
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "entry vanished or unreadable");
                report.stats.unreadable += 1;
                continue;
            }
        };
        report.stats.visited += 1;
        classify(&mut report, entry.path(), meta.uid(), meta.gid());
    }

    info!(
        visited = report.stats.visited,
        matched = report.stats.matched,
        unreadable = report.stats.unreadable,
        "scan complete"
    );
    Ok(report)
}

fn classify(report: &mut OwnershipReport, path: &Path, uid: u32, gid: u32) {
    let mut matched = false;
    if let Some(entry) = report.users.get_mut(&uid) {
        entry.paths.push(path.to_path_buf());
        matched = true;
    }
    if let Some(entry) = report.groups.get_mut(&gid) {
        entry.paths.push(path.to_path_buf());
        matched = true;
    }
    if matched {
        report.stats.matched += 1;
    }
}
