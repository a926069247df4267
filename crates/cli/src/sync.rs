//! `uidsync sync`: the reconciliation run.

use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use uidsync_core::apply::{running_as_root, ApplySummary, SystemModifier};
use uidsync_core::config::SyncConfig;
use uidsync_core::models::{IdRemapping, OwnershipReport};
use uidsync_core::report::{render_json, render_text};
use uidsync_core::SyncPipeline;

use crate::style;

pub async fn run_sync(config: SyncConfig, dry_run: bool, yes: bool, json: bool) -> Result<()> {
    info!(dry_run, yes, root = %config.local.scan_root.display(), "starting sync run");
    if !dry_run && !running_as_root() {
        eprintln!(
            "{}",
            style::warn("Not running as root; applying changes will most likely fail.")
        );
    }

    let root = config.local.scan_root.clone();
    let mut pipeline = SyncPipeline::new(config, Box::new(SystemModifier), dry_run)
        .context("failed to set up sync run")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    spinner.set_message("Fetching remote directory and reading local accounts...");
    let prepared = prepare(&mut pipeline, &spinner, &root).await;
    spinner.finish_and_clear();

    if let Err(e) = prepared {
        surface_partial(&pipeline, json);
        return Err(e);
    }
    let report = pipeline
        .report()
        .context("scan finished without a report")?
        .clone();

    if json {
        println!("{}", render_json(&report)?);
    } else {
        print_remappings(pipeline.remappings());
        println!();
        println!("{}", style::header("Files to re-own"));
        print!("{}", render_text(&report));
        print_scan_stats(&report);
    }

    if report.is_empty() {
        pipeline.apply().await?;
        if !json {
            println!("{}", style::success("Local IDs already match the directory."));
        }
        return Ok(());
    }

    if !dry_run && !yes {
        eprintln!();
        eprintln!(
            "{}",
            style::warn("Back up the system first. Review the users, groups and files above.")
        );
        let confirmed = Confirm::new()
            .with_prompt("Apply these ID changes?")
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            pipeline.decline()?;
            eprintln!("{}", style::warn("Apply cancelled. Nothing was changed."));
            return Ok(());
        }
    }

    let summary = pipeline.apply().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if !summary.is_success() {
        anyhow::bail!(
            "{} of {} entities failed to apply",
            summary.failures.len(),
            summary.failures.len() + summary.applied.len()
        );
    }
    Ok(())
}

async fn prepare(
    pipeline: &mut SyncPipeline,
    spinner: &ProgressBar,
    root: &std::path::Path,
) -> Result<()> {
    pipeline.load().await.context("failed to load snapshots")?;
    spinner.set_message("Reconciling...");
    pipeline.reconcile().context("reconciliation failed")?;
    spinner.set_message(format!(
        "Scanning {} for affected files (this may take a while)...",
        root.display()
    ));
    pipeline.scan().await.context("ownership scan failed")?;
    Ok(())
}

/// Show whatever the run produced before it failed.
fn surface_partial(pipeline: &SyncPipeline, json: bool) {
    if json {
        println!("{}", partial_json(pipeline));
        return;
    }
    if !pipeline.remappings().is_empty() {
        print_remappings(pipeline.remappings());
    }
    if let Some(report) = pipeline.report() {
        print!("{}", render_text(report));
    }
}

fn partial_json(pipeline: &SyncPipeline) -> serde_json::Value {
    serde_json::json!({
        "state": pipeline.state(),
        "remappings": pipeline.remappings(),
        "report": pipeline.report(),
    })
}

fn print_remappings(remaps: &[IdRemapping]) {
    println!();
    println!("{}", style::header("ID remappings"));
    if remaps.is_empty() {
        println!("{}", style::dim("  none"));
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Kind", "Name", "Local ID", "Directory ID"]);
    for r in remaps {
        table.add_row(vec![
            Cell::new(r.kind),
            Cell::new(&r.name),
            Cell::new(r.old_id),
            Cell::new(r.new_id).fg(Color::Cyan),
        ]);
    }
    println!("{}", table);
}

fn print_scan_stats(report: &OwnershipReport) {
    let stats = report.stats;
    println!(
        "{}",
        style::dim(&format!(
            "scanned {} entries, {} matched, {} unreadable",
            stats.visited, stats.matched, stats.unreadable
        ))
    );
    if stats.unreadable > 0 {
        println!(
            "{}",
            style::warn("Some entries could not be read; rerun with -v for details.")
        );
    }
}

fn print_summary(summary: &ApplySummary) {
    println!();
    if summary.dry_run {
        println!(
            "{}",
            style::header("Dry run: the following would be applied")
        );
    } else {
        println!("{}", style::header("Apply summary"));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Kind", "Name", "Change", "Paths", "Result"]);

    for a in &summary.applied {
        let result = if summary.dry_run {
            Cell::new("pending").fg(Color::Yellow)
        } else {
            Cell::new("✓ applied").fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(style::kind(a.kind)),
            Cell::new(&a.name),
            Cell::new(style::remap(a.old_id, a.new_id)),
            Cell::new(a.paths),
            result,
        ]);
    }
    for f in &summary.failures {
        let result = if f.rolled_back {
            Cell::new("✗ failed, rolled back").fg(Color::Red)
        } else {
            Cell::new("✗ failed, NEEDS ATTENTION").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(style::kind(f.kind)),
            Cell::new(&f.name),
            Cell::new(style::remap(f.old_id, f.new_id)),
            Cell::new("-"),
            result,
        ]);
    }
    println!("{}", table);

    for f in &summary.failures {
        println!("{}", style::error(&format!("{} {}: {}", f.kind, f.name, f.error)));
    }
    if summary.is_success() && !summary.dry_run {
        println!("{}", style::success("All changes applied."));
    }
}
