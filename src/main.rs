//! SoulSketch - file-backed memory packets with role-based projection
//!
//! Every packet printed by this binary has passed through the projector for
//! the requested role.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use soulsketch::{
    config::SoulSketchConfig,
    packet::{PacketFilter, Role, Visibility},
    sync::{DirectoryTarget, SyncEngine},
    EntryStore, MemoryVault,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "soulsketch")]
#[command(author = "SoulSketch Team")]
#[command(version)]
#[command(about = "File-backed memory packets with role-based projection")]
struct Cli {
    /// Configuration file path (TOML, or YAML by extension)
    #[arg(short, long, env = "SOULSKETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List packets visible to a role
    List {
        /// Caller role
        #[arg(short, long, default_value = "public")]
        role: Role,

        /// Exact project match
        #[arg(long)]
        project: Option<String>,

        /// Any-of tag match (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Any-of author match (repeatable)
        #[arg(long = "author")]
        authors: Vec<String>,

        /// Exact visibility match
        #[arg(long)]
        visibility: Option<Visibility>,

        /// Created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Created on or before this date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<NaiveDate>,
    },

    /// Show one packet as a role
    Show {
        id: String,

        /// Caller role
        #[arg(short, long, default_value = "public")]
        role: Role,
    },

    /// Delete a packet
    Delete { id: String },

    /// Check every packet document in the store
    Audit,

    /// Record a recall entry
    Remember {
        /// Entry type (e.g. observation, plan)
        entry_type: String,

        /// Content; parsed as JSON when valid, otherwise stored as text
        content: String,
    },

    /// Search recall entries, newest first
    Search {
        query: String,

        /// Maximum results (defaults to recall.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Mirror projected views to the sync target
    Sync {
        /// Target directory (overrides sync.target_dir and enables sync)
        #[arg(long)]
        target: Option<PathBuf>,

        /// Role to project for (overrides sync.role)
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SoulSketchConfig::load_or_default(cli.config.as_deref())?;

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let json = cli.log_json || config.logging.json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("soulsketch={}", log_level).into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    match cli.command {
        Commands::List {
            role,
            project,
            tags,
            authors,
            visibility,
            since,
            until,
        } => {
            let mut filter = PacketFilter {
                project,
                tags,
                visibility,
                authors,
                ..Default::default()
            };
            if let Some(date) = since {
                filter = filter.since_date(date);
            }
            if let Some(date) = until {
                filter = filter.until_date(date);
            }
            list_packets(&config, &filter, role).await?;
        }
        Commands::Show { id, role } => {
            show_packet(&config, &id, role).await?;
        }
        Commands::Delete { id } => {
            let deleted = MemoryVault::from_config(&config).delete(&id).await?;
            print_json(&serde_json::json!({ "id": id, "deleted": deleted }))?;
        }
        Commands::Audit => {
            let report = MemoryVault::from_config(&config).store().audit().await?;
            print_json(&report)?;
        }
        Commands::Remember {
            entry_type,
            content,
        } => {
            let entries = EntryStore::from_config(&config.storage).await?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .unwrap_or(serde_json::Value::String(content));
            let entry = entries.write(&entry_type, value, None).await?;
            print_json(&entry)?;
        }
        Commands::Search { query, limit } => {
            let entries = EntryStore::from_config(&config.storage).await?;
            let limit = limit.unwrap_or(config.recall.default_limit);
            print_json(&entries.search(&query, limit).await)?;
        }
        Commands::Sync { target, role } => {
            run_sync(&config, target, role).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn list_packets(config: &SoulSketchConfig, filter: &PacketFilter, role: Role) -> Result<()> {
    let vault = MemoryVault::from_config(config);
    let listing = vault.list_as(filter, role).await?;

    for failure in &listing.failures {
        eprintln!("skipped {}: {}", failure.path.display(), failure.error);
    }
    tracing::debug!(
        shown = listing.views.len(),
        hidden = listing.hidden,
        role = %role,
        "Listing complete"
    );
    print_json(&listing.views)
}

async fn show_packet(config: &SoulSketchConfig, id: &str, role: Role) -> Result<()> {
    let vault = MemoryVault::from_config(config);
    match vault.read_as(id, role).await? {
        Some(view) => print_json(&view),
        None => bail!("no packet '{}' visible to role {}", id, role),
    }
}

async fn run_sync(
    config: &SoulSketchConfig,
    target: Option<PathBuf>,
    role: Option<Role>,
) -> Result<()> {
    let engine = match (target, role) {
        (None, None) => SyncEngine::from_config(&config.sync)?,
        (target, role) => target
            .or_else(|| config.sync.target_dir.clone())
            .map(|dir| {
                SyncEngine::new(
                    Box::new(DirectoryTarget::new(dir)),
                    role.unwrap_or(config.sync.role),
                )
            }),
    };
    let Some(engine) = engine else {
        bail!("sync is disabled; set sync.enabled and sync.target_dir or pass --target");
    };

    let vault = MemoryVault::from_config(config);
    let report = engine.sync(vault.store()).await?;
    print_json(&report)
}

fn show_config(config: Option<&SoulSketchConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml()?);
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
