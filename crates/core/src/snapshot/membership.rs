//! Cross-reference of local users and groups.
//!
//! A user belongs to every group whose GID equals the user's primary GID and
//! to every group that lists the user explicitly. Each membership is reported
//! once even when both rules apply.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::LocalSnapshot;

/// Group reference attached to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRef {
    pub name: String,
    pub gid: u32,
}

/// A group member, resolved to a local account where possible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Member {
    Resolved { username: String, uid: u32 },
    /// Listed in the group file but absent from the passwd file.
    Unresolved(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMembership {
    pub name: String,
    pub uid: u32,
    pub member_of: Vec<GroupRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMembership {
    pub name: String,
    pub gid: u32,
    pub members: Vec<Member>,
}

/// Users ordered by UID and groups ordered by GID, each with the other side
/// of the relation expanded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipView {
    pub users: Vec<UserMembership>,
    pub groups: Vec<GroupMembership>,
}

impl MembershipView {
    pub fn build(snapshot: &LocalSnapshot) -> Self {
        let mut users: Vec<_> = snapshot.users.iter().collect();
        users.sort_by_key(|u| u.uid);
        let mut groups: Vec<_> = snapshot.groups.iter().collect();
        groups.sort_by_key(|g| g.gid);

        let user_view = users
            .iter()
            .map(|user| UserMembership {
                name: user.name.clone(),
                uid: user.uid,
                member_of: groups
                    .iter()
                    .filter(|g| g.gid == user.gid || g.members.contains(&user.name))
                    .map(|g| GroupRef {
                        name: g.name.clone(),
                        gid: g.gid,
                    })
                    .collect(),
            })
            .collect();

        let group_view = groups
            .iter()
            .map(|group| {
                let mut seen = BTreeSet::new();
                let mut members = Vec::new();
                for user in users
                    .iter()
                    .filter(|u| u.gid == group.gid || group.members.contains(&u.name))
                {
                    seen.insert(user.name.as_str());
                    members.push(Member::Resolved {
                        username: user.name.clone(),
                        uid: user.uid,
                    });
                }
                for name in &group.members {
                    if !seen.contains(name.as_str()) {
                        members.push(Member::Unresolved(name.clone()));
                    }
                }
                GroupMembership {
                    name: group.name.clone(),
                    gid: group.gid,
                    members,
                }
            })
            .collect();

        Self {
            users: user_view,
            groups: group_view,
        }
    }
}
