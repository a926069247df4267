//! `uidsync local`: local users and groups with memberships expanded.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use uidsync_core::config::SyncConfig;
use uidsync_core::snapshot::load_local_snapshot;
use uidsync_core::snapshot::membership::Member;
use uidsync_core::MembershipView;

use crate::{style, truncate};

pub fn run_local(config: &SyncConfig, json: bool) -> Result<()> {
    let snapshot = load_local_snapshot(&config.local).context("failed to read local account files")?;
    let view = MembershipView::build(&snapshot);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!();
    println!("{}", style::header("Users"));
    let mut users = Table::new();
    users.load_preset(UTF8_FULL);
    users.set_content_arrangement(ContentArrangement::Dynamic);
    users.set_header(vec!["Name", "UID", "Groups"]);
    for u in &view.users {
        let groups: Vec<String> = u
            .member_of
            .iter()
            .map(|g| format!("{}({})", g.name, g.gid))
            .collect();
        users.add_row(vec![
            Cell::new(&u.name),
            Cell::new(u.uid),
            Cell::new(truncate(&groups.join(", "), 60)),
        ]);
    }
    println!("{}", users);

    println!();
    println!("{}", style::header("Groups"));
    let mut groups = Table::new();
    groups.load_preset(UTF8_FULL);
    groups.set_content_arrangement(ContentArrangement::Dynamic);
    groups.set_header(vec!["Name", "GID", "Members", "Unresolved"]);
    for g in &view.groups {
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();
        for m in &g.members {
            match m {
                Member::Resolved { username, uid } => resolved.push(format!("{}({})", username, uid)),
                Member::Unresolved(name) => unresolved.push(name.as_str()),
            }
        }
        let unresolved_cell = if unresolved.is_empty() {
            Cell::new("")
        } else {
            Cell::new(unresolved.join(", ")).fg(Color::Yellow)
        };
        groups.add_row(vec![
            Cell::new(&g.name),
            Cell::new(g.gid),
            Cell::new(truncate(&resolved.join(", "), 60)),
            unresolved_cell,
        ]);
    }
    println!("{}", groups);
    println!(
        "{}",
        style::dim(&format!(
            "{} users, {} groups",
            view.users.len(),
            view.groups.len()
        ))
    );
    Ok(())
}
