//! Reader for passwd- and group-format account files.
//!
//! ```text
//! alice:x:1005:1005:Alice:/home/alice:/bin/bash
//! devs:x:1100:alice,bob
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::{LocalConfig, MalformedPolicy};
use crate::errors::SnapshotError;
use crate::models::{LocalGroup, LocalIdentity, LocalSnapshot};

const PASSWD_MIN_FIELDS: usize = 4;
const GROUP_MIN_FIELDS: usize = 3;

/// Read both local files named in `config` into a [`LocalSnapshot`].
pub fn load_local_snapshot(config: &LocalConfig) -> Result<LocalSnapshot, SnapshotError> {
    let policy = config.malformed_records;
    let users = read_passwd(&config.passwd_path, policy)?;
    let groups = read_group(&config.group_path, policy)?;
    info!(
        users = users.len(),
        groups = groups.len(),
        "loaded local snapshot"
    );
    Ok(LocalSnapshot { users, groups })
}

pub fn read_passwd(path: &Path, policy: MalformedPolicy) -> Result<Vec<LocalIdentity>, SnapshotError> {
    let contents = read_file(path)?;
    parse_passwd(&contents, path, policy)
}

pub fn read_group(path: &Path, policy: MalformedPolicy) -> Result<Vec<LocalGroup>, SnapshotError> {
    let contents = read_file(path)?;
    parse_group(&contents, path, policy)
}

fn read_file(path: &Path) -> Result<String, SnapshotError> {
    std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse passwd-format text. `path` is only used in error messages.
pub fn parse_passwd(
    contents: &str,
    path: &Path,
    policy: MalformedPolicy,
) -> Result<Vec<LocalIdentity>, SnapshotError> {
    let mut users = Vec::new();
    for (line_no, fields) in records(contents) {
        match passwd_record(&fields) {
            Ok(user) => users.push(user),
            Err(detail) => handle_malformed(path, line_no, detail, policy)?,
        }
    }
    debug!(path = %path.display(), count = users.len(), "parsed passwd records");
    Ok(users)
}

/// Parse group-format text. The member list field may be absent.
pub fn parse_group(
    contents: &str,
    path: &Path,
    policy: MalformedPolicy,
) -> Result<Vec<LocalGroup>, SnapshotError> {
    let mut groups = Vec::new();
    for (line_no, fields) in records(contents) {
        match group_record(&fields) {
            Ok(group) => groups.push(group),
            Err(detail) => handle_malformed(path, line_no, detail, policy)?,
        }
    }
    debug!(path = %path.display(), count = groups.len(), "parsed group records");
    Ok(groups)
}

fn passwd_record(fields: &[&str]) -> Result<LocalIdentity, String> {
    check_field_count(fields, PASSWD_MIN_FIELDS)?;
    Ok(LocalIdentity {
        name: parse_name(fields[0])?,
        uid: parse_id(fields[2], "uid")?,
        gid: parse_id(fields[3], "gid")?,
    })
}

fn group_record(fields: &[&str]) -> Result<LocalGroup, String> {
    check_field_count(fields, GROUP_MIN_FIELDS)?;
    let members: BTreeSet<String> = fields
        .get(3)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok(LocalGroup {
        name: parse_name(fields[0])?,
        gid: parse_id(fields[2], "gid")?,
        members,
    })
}

/// Non-blank, non-comment lines split on `:`, with 1-based line numbers.
fn records(contents: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    contents
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(line_no, line)| (line_no, line.split(':').collect()))
}

fn check_field_count(fields: &[&str], min: usize) -> Result<(), String> {
    if fields.len() < min {
        return Err(format!(
            "expected at least {} fields, found {}",
            min,
            fields.len()
        ));
    }
    Ok(())
}

fn parse_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("empty name".into());
    }
    Ok(name.to_string())
}

fn parse_id(raw: &str, field: &str) -> Result<u32, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{} '{}' is not a valid numeric ID", field, raw))
}

fn handle_malformed(
    path: &Path,
    line: usize,
    detail: String,
    policy: MalformedPolicy,
) -> Result<(), SnapshotError> {
    match policy {
        MalformedPolicy::Skip => {
            warn!(path = %path.display(), line, %detail, "skipping malformed record");
            Ok(())
        }
        MalformedPolicy::Fail => Err(SnapshotError::MalformedLocalRecord {
            path: path.to_path_buf(),
            line,
            detail,
        }),
    }
}
