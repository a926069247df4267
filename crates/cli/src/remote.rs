//! Read-only remote directory commands: `users`, `groups`, `logs`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use uidsync_core::config::SyncConfig;
use uidsync_core::directory::filter::matches_all;
use uidsync_core::directory::{write_csv, DirectoryClient, LogEntry, LogFilter, LogSource};

use crate::{style, truncate};

fn client(config: &SyncConfig) -> Result<DirectoryClient> {
    DirectoryClient::new(&config.directory).context("failed to create directory client")
}

pub async fn run_users(config: &SyncConfig, json: bool) -> Result<()> {
    let mut users = client(config)?
        .list_users()
        .await
        .context("failed to list remote users")?;
    users.sort_by_key(|u| u.uid);

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Username", "UID", "GID"]);
    for u in &users {
        table.add_row(vec![
            Cell::new(&u.name),
            Cell::new(u.uid),
            Cell::new(u.gid.map(|g| g.to_string()).unwrap_or_else(|| "—".into())),
        ]);
    }
    println!("{}", table);
    println!("{} user(s)", users.len());
    Ok(())
}

pub async fn run_groups(config: &SyncConfig, json: bool) -> Result<()> {
    let mut groups = client(config)?
        .list_groups()
        .await
        .context("failed to list remote groups")?;
    groups.sort_by_key(|g| g.gid);

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    if groups.is_empty() {
        println!("No groups found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "GID", "Members"]);
    for g in &groups {
        table.add_row(vec![
            Cell::new(&g.name),
            Cell::new(g.gid),
            Cell::new(truncate(&g.members.join(", "), 60)),
        ]);
    }
    println!("{}", table);
    println!("{} group(s)", groups.len());
    Ok(())
}

/// What `uidsync logs` should fetch and how to print it.
#[derive(Debug)]
pub struct LogQuery {
    pub source: LogSource,
    pub hours: u32,
    pub filters: Vec<LogFilter>,
    pub csv: Option<PathBuf>,
    pub json: bool,
}

pub async fn run_logs(config: &SyncConfig, query: &LogQuery) -> Result<()> {
    let to = Utc::now();
    let from = to - Duration::hours(i64::from(query.hours));

    let entries = client(config)?
        .logs(query.source, from, to)
        .await
        .with_context(|| format!("failed to fetch {} logs", query.source))?;
    let total = entries.len();
    let shown: Vec<&LogEntry> = entries
        .iter()
        .filter(|e| matches_all(&query.filters, e))
        .collect();

    if let Some(path) = &query.csv {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        write_csv(query.source, &shown, file)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!(
            "{}",
            style::success(&format!("Wrote {} entries to {}", shown.len(), path.display()))
        );
        return Ok(());
    }
    if query.json {
        for entry in &shown {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }
    if shown.is_empty() {
        println!(
            "No matching {} log entries in the last {} hour(s).",
            query.source, query.hours
        );
        return Ok(());
    }

    let columns = query.source.columns();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(columns.iter().map(|(header, _)| *header).collect::<Vec<_>>());
    for entry in &shown {
        let row: Vec<Cell> = columns
            .iter()
            .enumerate()
            .map(|(idx, (_, field))| {
                let value = truncate(&entry.field(field).unwrap_or_default(), 80);
                match idx {
                    1 => Cell::new(&value).fg(event_color(&value)),
                    _ => Cell::new(value),
                }
            })
            .collect();
        table.add_row(row);
    }
    println!("{}", table);
    println!(
        "{}",
        style::dim(&format!("{} of {} entries shown", shown.len(), total))
    );
    Ok(())
}

/// Stable colour per value of the second column.
fn event_color(value: &str) -> Color {
    const PALETTE: [Color; 6] = [
        Color::Cyan,
        Color::Green,
        Color::Yellow,
        Color::Magenta,
        Color::Blue,
        Color::Red,
    ];
    let sum = value.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
    PALETTE[sum % PALETTE.len()]
}
