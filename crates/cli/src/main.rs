//! uidsync command-line tool.
//!
//! Reconciles local UIDs/GIDs against a remote directory and re-owns the
//! affected files, lists remote users and groups, pulls event logs, and
//! generates / validates configuration files.

mod local;
mod remote;
mod style;
mod sync;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use uidsync_core::config::{default_config_path, MalformedPolicy, SyncConfig};
use uidsync_core::directory::{FilterOp, LogFilter, LogSource};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// uidsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "uidsync",
    version,
    about = "Reconcile local UIDs/GIDs with a remote directory and fix file ownership"
)]
struct Cli {
    /// Path to the TOML configuration file [default: ~/.config/uidsync/config.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile IDs, report owned files, and apply after confirmation.
    Sync(SyncArgs),

    /// List users in the remote directory.
    Users {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List groups in the remote directory.
    Groups {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Pull event, LDAP or RADIUS logs from the remote directory.
    Logs(LogsArgs),

    /// Show local users and groups with memberships expanded.
    Local {
        /// Local passwd-format file.
        #[arg(long)]
        passwd: Option<PathBuf>,

        /// Local group-format file.
        #[arg(long)]
        group: Option<PathBuf>,

        /// Print JSON instead of tables.
        #[arg(long)]
        json: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path [default: ~/.config/uidsync/config.toml].
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,
}

/// Remote directory connection overrides.
#[derive(Args, Debug, Default)]
struct RemoteArgs {
    /// API token. Falls back to the environment variable named in the config.
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of the directory API.
    #[arg(long)]
    api_url: Option<String>,
}

#[derive(Args, Debug)]
struct SyncArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// Lowest UID considered for remapping.
    #[arg(long)]
    min_uid: Option<u32>,

    /// Lowest GID considered for remapping.
    #[arg(long)]
    min_gid: Option<u32>,

    /// Local user never remapped (repeatable).
    #[arg(long = "ignore-user", value_name = "NAME")]
    ignore_users: Vec<String>,

    /// Local group never remapped (repeatable).
    #[arg(long = "ignore-group", value_name = "NAME")]
    ignore_groups: Vec<String>,

    /// Root of the ownership scan.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Local passwd-format file.
    #[arg(long)]
    passwd: Option<PathBuf>,

    /// Local group-format file.
    #[arg(long)]
    group: Option<PathBuf>,

    /// Abort on malformed local records instead of skipping them.
    #[arg(long)]
    strict: bool,

    /// Report only; never modify anything.
    #[arg(long)]
    dry_run: bool,

    /// Apply without asking for confirmation.
    #[arg(short, long)]
    yes: bool,

    /// Print the report and summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct LogsArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// Which log to pull: event, ldap or radius.
    #[arg(long, default_value = "event")]
    source: LogSource,

    /// How far back to fetch, in hours.
    #[arg(long, default_value = "168")]
    hours: u32,

    /// Only show this event type (event logs).
    #[arg(long)]
    event_type: Option<String>,

    /// Only show binds by this DN (ldap logs).
    #[arg(long)]
    bind_dn: Option<String>,

    /// Only show this bind type (ldap logs).
    #[arg(long = "type", value_name = "TYPE")]
    bind_type: Option<String>,

    /// Only show this username (radius logs).
    #[arg(long)]
    user: Option<String>,

    /// Only show attempts from this RADIUS client, by name from [logs.locations].
    #[arg(long)]
    location: Option<String>,

    /// Only show successful (true) or failed (false) attempts.
    #[arg(long)]
    outcome: Option<bool>,

    /// FIELD:OP:VALUE predicate, OP one of eq, ne, contains, is (repeatable).
    #[arg(long = "filter", value_name = "FIELD:OP:VALUE")]
    filters: Vec<LogFilter>,

    /// Write matching entries to this CSV file instead of printing them.
    #[arg(long, value_name = "PATH", conflicts_with = "json")]
    csv: Option<PathBuf>,

    /// Print one JSON object per line.
    #[arg(long)]
    json: bool,
}

impl LogsArgs {
    /// Fold the shorthand flags into the filter list.
    fn all_filters(&self, config: &SyncConfig) -> Result<Vec<LogFilter>> {
        let mut filters = self.filters.clone();
        if let Some(event_type) = &self.event_type {
            filters.push(LogFilter::event_type(event_type.clone()));
        }
        if let Some(dn) = &self.bind_dn {
            filters.push(LogFilter::new("bindDn", FilterOp::Eq, dn.clone()));
        }
        if let Some(bind_type) = &self.bind_type {
            filters.push(LogFilter::new("type", FilterOp::Eq, bind_type.clone()));
        }
        if let Some(user) = &self.user {
            filters.push(LogFilter::new("username", FilterOp::Eq, user.clone()));
        }
        if let Some(location) = &self.location {
            let ip = config
                .logs
                .location_ip(location)
                .context("invalid --location")?;
            filters.push(LogFilter::new("ipAddress", FilterOp::Eq, ip));
        }
        if let Some(outcome) = self.outcome {
            filters.push(LogFilter::outcome(outcome));
        }
        Ok(filters)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { output } => cmd_init(output),
        Commands::Validate => cmd_validate(config_path),
        Commands::Sync(args) => {
            let config = sync_config(config_path, &args)?;
            sync::run_sync(config, args.dry_run, args.yes, args.json).await
        }
        Commands::Users { remote, json } => {
            let config = remote_config(config_path, &remote)?;
            remote::run_users(&config, json).await
        }
        Commands::Groups { remote, json } => {
            let config = remote_config(config_path, &remote)?;
            remote::run_groups(&config, json).await
        }
        Commands::Logs(args) => {
            let config = remote_config(config_path, &args.remote)?;
            let query = remote::LogQuery {
                source: args.source,
                hours: args.hours,
                filters: args.all_filters(&config)?,
                csv: args.csv,
                json: args.json,
            };
            remote::run_logs(&config, &query).await
        }
        Commands::Local {
            passwd,
            group,
            json,
        } => {
            let mut config = load_config(config_path)?;
            if let Some(passwd) = passwd {
                config.local.passwd_path = passwd;
            }
            if let Some(group) = group {
                config.local.group_path = group;
            }
            local::run_local(&config, json)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// An explicit path must exist; the implicit per-user path may be absent.
fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load_from_file(path).context("failed to load configuration file"),
        None => {
            let path = default_config_path(dirs::config_dir());
            debug!(path = %path.display(), "no --config given, trying default location");
            SyncConfig::load_or_default(&path).context("failed to load configuration file")
        }
    }
}

/// Layer connection flags over the file, resolve the token, validate.
fn remote_config(path: Option<&Path>, remote: &RemoteArgs) -> Result<SyncConfig> {
    let mut config = load_config(path)?;
    apply_remote_overrides(&mut config, remote);
    finish_config(config)
}

fn sync_config(path: Option<&Path>, args: &SyncArgs) -> Result<SyncConfig> {
    let mut config = load_config(path)?;
    apply_remote_overrides(&mut config, &args.remote);

    if let Some(min_uid) = args.min_uid {
        config.reconcile.min_uid = min_uid;
    }
    if let Some(min_gid) = args.min_gid {
        config.reconcile.min_gid = min_gid;
    }
    config
        .reconcile
        .ignore_users
        .extend(args.ignore_users.iter().cloned());
    config
        .reconcile
        .ignore_groups
        .extend(args.ignore_groups.iter().cloned());
    if let Some(root) = &args.root {
        config.local.scan_root = root.clone();
    }
    if let Some(passwd) = &args.passwd {
        config.local.passwd_path = passwd.clone();
    }
    if let Some(group) = &args.group {
        config.local.group_path = group.clone();
    }
    if args.strict {
        config.local.malformed_records = MalformedPolicy::Fail;
    }

    finish_config(config)
}

fn apply_remote_overrides(config: &mut SyncConfig, remote: &RemoteArgs) {
    if let Some(url) = &remote.api_url {
        config.directory.api_url = url.clone();
    }
    if let Some(key) = &remote.api_key {
        config.directory.api_key = Some(key.clone());
    }
}

fn finish_config(mut config: SyncConfig) -> Result<SyncConfig> {
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"# uidsync configuration
# Every field is optional; the values below are the defaults.

[directory]
api_url = "https://api.foxpass.com/v1/"
# Name of the environment variable holding the API token.
api_key_env = "UIDSYNC_API_KEY"
timeout_secs = 30

[local]
passwd_path = "/etc/passwd"
group_path = "/etc/group"
scan_root = "/"
# "skip" logs and ignores unparseable records, "fail" aborts the run.
malformed_records = "skip"
one_file_system = true

[reconcile]
min_uid = 1000
min_gid = 500
ignore_users = []
ignore_groups = []

# RADIUS client names for `uidsync logs --source radius --location NAME`.
[logs.locations]
# office1 = "203.0.113.10"
"#;

fn cmd_init(output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| default_config_path(dirs::config_dir()));

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Export your API token: export UIDSYNC_API_KEY=...");
    println!(
        "  2. Validate with: uidsync validate --config {}",
        output.display()
    );
    println!(
        "  3. Preview changes: uidsync sync --dry-run --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_config_path(dirs::config_dir()));
    println!("Validating configuration: {}", path.display());
    println!();

    let mut config = SyncConfig::load_from_file(&path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  API URL       : {}", config.directory.api_url);
    println!(
        "  API key       : {} (${})",
        if config.directory.api_key.is_some() {
            "set"
        } else {
            "NOT SET"
        },
        config.directory.api_key_env
    );
    println!("  Timeout       : {}s", config.directory.timeout_secs);
    println!("  passwd file   : {}", config.local.passwd_path.display());
    println!("  group file    : {}", config.local.group_path.display());
    println!("  Scan root     : {}", config.local.scan_root.display());
    println!("  Min UID / GID : {} / {}", config.reconcile.min_uid, config.reconcile.min_gid);
    println!("  Ignored users : {}", join_or_none(&config.reconcile.ignore_users));
    println!("  Ignored groups: {}", join_or_none(&config.reconcile.ignore_groups));
    println!();
    println!("Configuration is valid.");

    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn join_or_none<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let joined = names
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

/// Shorten `s` to at most `max_len` characters.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
