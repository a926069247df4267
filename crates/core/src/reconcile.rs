//! Cross-reference of local and remote snapshots.
//!
//! An entity is remapped when it exists under the same name on both sides,
//! passes the eligibility filters, and carries a different numeric ID. The
//! remote ID is the desired value.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::errors::ReconcileError;
use crate::models::{EntityKind, IdRemapping, LocalSnapshot, RemoteSnapshot};

/// Compute the ID remappings for users then groups.
pub fn reconcile(
    local: &LocalSnapshot,
    remote: &RemoteSnapshot,
    config: &ReconcileConfig,
) -> Result<Vec<IdRemapping>, ReconcileError> {
    let ignore_users: HashSet<&str> = config.ignore_users.iter().map(String::as_str).collect();
    let ignore_groups: HashSet<&str> = config.ignore_groups.iter().map(String::as_str).collect();

    let users = remap_kind(
        EntityKind::User,
        local.users.iter().map(|u| (u.name.as_str(), u.uid)),
        remote.users.iter().map(|u| (u.name.as_str(), u.uid)),
        config.min_uid,
        &ignore_users,
    )?;
    let groups = remap_kind(
        EntityKind::Group,
        local.groups.iter().map(|g| (g.name.as_str(), g.gid)),
        remote.groups.iter().map(|g| (g.name.as_str(), g.gid)),
        config.min_gid,
        &ignore_groups,
    )?;

    info!(
        users = users.len(),
        groups = groups.len(),
        "reconciliation complete"
    );
    Ok(users.into_iter().chain(groups).collect())
}

fn remap_kind<'a>(
    kind: EntityKind,
    local: impl Iterator<Item = (&'a str, u32)>,
    remote: impl Iterator<Item = (&'a str, u32)>,
    min_id: u32,
    ignore: &HashSet<&str>,
) -> Result<Vec<IdRemapping>, ReconcileError> {
    let mut remote_by_name: HashMap<&str, Vec<u32>> = HashMap::new();
    for (name, id) in remote {
        remote_by_name.entry(name).or_default().push(id);
    }

    let local: Vec<(&str, u32)> = local.collect();
    let local_ids: HashSet<u32> = local.iter().map(|(_, id)| *id).collect();

    let mut seen = HashSet::new();
    let mut remaps = Vec::new();
    for (name, old_id) in local {
        if old_id < min_id || ignore.contains(name) {
            continue;
        }
        if !seen.insert(name) {
            warn!(%kind, entity = name, "duplicate local entry, keeping the first");
            continue;
        }
        let Some(remote_ids) = remote_by_name.get(name) else {
            continue;
        };
        if remote_ids.len() > 1 {
            return Err(ReconcileError::AmbiguousRemoteMatch {
                kind,
                name: name.to_string(),
                count: remote_ids.len(),
            });
        }
        let new_id = remote_ids[0];
        if new_id == old_id {
            continue;
        }
        if local_ids.contains(&new_id) {
            warn!(%kind, entity = name, new_id, "new ID is already in use locally");
        }
        debug!(%kind, entity = name, old_id, new_id, "remapping");
        remaps.push(IdRemapping {
            kind,
            name: name.to_string(),
            old_id,
            new_id,
        });
    }

    check_shared_ids(kind, &remaps)?;
    Ok(remaps)
}

/// File ownership is keyed by old ID, so two remapped entities of the same
/// kind cannot share one.
fn check_shared_ids(kind: EntityKind, remaps: &[IdRemapping]) -> Result<(), ReconcileError> {
    let mut by_old: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    for r in remaps {
        by_old.entry(r.old_id).or_default().push(&r.name);
    }
    match by_old.into_iter().find(|(_, names)| names.len() > 1) {
        Some((old_id, names)) => Err(ReconcileError::SharedLocalId {
            kind,
            old_id,
            names: names.into_iter().map(str::to_string).collect(),
        }),
        None => Ok(()),
    }
}
