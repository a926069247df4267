//! Plain-text and JSON rendering of an [`OwnershipReport`].
//!
//! Rendering depends only on the report contents, so a dry run and a live run
//! over the same tree produce identical output.

use std::fmt::Write as _;

use crate::models::{OwnershipEntry, OwnershipReport};

/// Render the report for operator review.
pub fn render_text(report: &OwnershipReport) -> String {
    let mut out = String::new();
    if report.is_empty() {
        out.push_str("no ID changes required\n");
        return out;
    }
    for entry in report.entries() {
        write_entry(&mut out, entry);
    }
    let _ = writeln!(
        out,
        "{} entities, {} paths to re-own",
        report.users.len() + report.groups.len(),
        report.path_count()
    );
    out
}

fn write_entry(out: &mut String, entry: &OwnershipEntry) {
    let paths = match entry.paths.len() {
        0 => "no paths".to_string(),
        1 => "1 path".to_string(),
        n => format!("{n} paths"),
    };
    let _ = writeln!(
        out,
        "{} {}: {} -> {} ({paths})",
        entry.kind, entry.name, entry.old_id, entry.new_id
    );
    for path in &entry.paths {
        let _ = writeln!(out, "  {}", path.display());
    }
}

/// Render the report as pretty-printed JSON.
pub fn render_json(report: &OwnershipReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
