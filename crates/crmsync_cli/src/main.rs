//! crmsync CLI - run and schedule CRM syncs from the command line.

mod commands;
mod config;
#[cfg(feature = "wecom")]
mod progress;
#[cfg(feature = "wecom")]
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
#[cfg(feature = "wecom")]
use clap::ValueEnum;
use console::Term;
#[cfg(feature = "wecom")]
use crmsync::sync::SyncKind;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crmsync")]
#[command(version)]
#[command(about = "Mirror WeCom customers and customer groups into a local database")]
#[command(
    long_about = "crmsync pulls external contacts and customer group chats from WeCom and \
upserts them into a local SQLite or PostgreSQL database. Full syncs refresh every customer, \
incremental syncs only new and stale ones, and the scheduler runs incremental syncs on a \
fixed wall-clock cadence."
)]
#[command(after_long_help = r#"EXAMPLES
    Create the schema:
        $ crmsync migrate up

    Refresh every customer with 20 workers:
        $ crmsync sync full --workers 20

    Fetch new customers and ones not synced in the last 12 hours:
        $ crmsync sync incremental --stale-after-hours 12

    Run an incremental sync every 30 minutes until Ctrl+C:
        $ crmsync schedule --interval-minutes 30

    Generate shell completions:
        $ crmsync completions bash > ~/.local/share/bash-completion/completions/crmsync

CONFIGURATION
    crmsync reads configuration from:
      1. ~/.config/crmsync/config.toml (or $XDG_CONFIG_HOME/crmsync/config.toml)
      2. ./crmsync.toml
      3. Environment variables (CRMSYNC_* prefix, e.g., CRMSYNC_SYNC__WORKERS)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    CRMSYNC_DATABASE_URL      Database connection string (default: ~/.local/state/crmsync/crmsync.db)
    CRMSYNC_CORP_ID           WeCom corp id
    CRMSYNC_CONTACT_SECRET    Address book secret (staff listing)
    CRMSYNC_CUSTOMER_SECRET   Customer contact secret
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run one sync task and wait for it to finish
    #[cfg(feature = "wecom")]
    Sync {
        /// What to sync
        #[arg(value_enum)]
        target: SyncTarget,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Run incremental syncs on a fixed cadence until interrupted
    #[cfg(feature = "wecom")]
    Schedule {
        /// Minutes between runs, aligned to the wall clock (default from config or 60)
        #[arg(short = 'i', long)]
        interval_minutes: Option<u32>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[cfg(feature = "wecom")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SyncTarget {
    /// Every customer of every staff member
    Full,
    /// New customers and customers whose local copy is stale
    Incremental,
    /// Every customer group chat
    Groups,
}

#[cfg(feature = "wecom")]
impl From<SyncTarget> for SyncKind {
    fn from(target: SyncTarget) -> Self {
        match target {
            SyncTarget::Full => SyncKind::Full,
            SyncTarget::Incremental => SyncKind::Incremental,
            SyncTarget::Groups => SyncKind::GroupSync,
        }
    }
}

/// Options shared by `sync` and `schedule`.
#[cfg(feature = "wecom")]
#[derive(Debug, Clone, clap::Args)]
struct SyncArgs {
    /// Concurrent fetch+upsert units (default from config or 10)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Re-fetch customers not synced within this many hours (default from config or 6)
    #[arg(short = 's', long)]
    stale_after_hours: Option<i64>,

    /// Disable proactive rate limiting (may cause API throttling)
    #[arg(short = 'R', long)]
    no_rate_limit: bool,
}

fn init_tracing() {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("crmsync=info,crmsync_cli=info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Structured logs when piped; the scheduler always logs since it has no bar.
    #[cfg(feature = "wecom")]
    let always_log = matches!(cli.command, Commands::Schedule { .. });
    #[cfg(not(feature = "wecom"))]
    let always_log = false;
    if always_log || !Term::stdout().is_term() {
        init_tracing();
    }

    let config = config::Config::load();

    // Handle commands that don't require database access first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set [database] url or CRMSYNC_DATABASE_URL")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        #[cfg(feature = "wecom")]
        Commands::Sync { target, sync_opts } => {
            let shutdown = shutdown::setup_shutdown_handler();
            commands::sync::handle_sync(
                target.into(),
                &sync_opts,
                &config,
                &database_url,
                shutdown,
            )
            .await?;
        }
        #[cfg(feature = "wecom")]
        Commands::Schedule {
            interval_minutes,
            sync_opts,
        } => {
            let shutdown = shutdown::setup_shutdown_handler();
            commands::schedule::handle_schedule(
                interval_minutes,
                &sync_opts,
                &config,
                &database_url,
                shutdown,
            )
            .await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[cfg(feature = "wecom")]
    #[test]
    fn parses_sync_with_overrides() {
        let cli = Cli::try_parse_from([
            "crmsync",
            "sync",
            "incremental",
            "--workers",
            "4",
            "--stale-after-hours",
            "12",
            "-R",
        ])
        .expect("valid arguments");
        match cli.command {
            Commands::Sync { target, sync_opts } => {
                assert_eq!(SyncKind::from(target), SyncKind::Incremental);
                assert_eq!(sync_opts.workers, Some(4));
                assert_eq!(sync_opts.stale_after_hours, Some(12));
                assert!(sync_opts.no_rate_limit);
            }
            _ => panic!("expected sync command"),
        }
    }

    #[cfg(feature = "wecom")]
    #[test]
    fn groups_target_maps_to_group_sync() {
        let cli = Cli::try_parse_from(["crmsync", "sync", "groups"]).expect("valid arguments");
        assert!(matches!(
            cli.command,
            Commands::Sync {
                target: SyncTarget::Groups,
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_migrate_action() {
        assert!(Cli::try_parse_from(["crmsync", "migrate", "sideways"]).is_err());
    }

    #[test]
    fn sync_commands_follow_the_wecom_feature() {
        let cmd = Cli::command();
        let names: Vec<&str> = cmd.get_subcommands().map(|c| c.get_name()).collect();

        assert!(names.contains(&"migrate"));
        assert!(names.contains(&"man"));
        assert_eq!(names.contains(&"sync"), cfg!(feature = "wecom"));
        assert_eq!(names.contains(&"schedule"), cfg!(feature = "wecom"));
    }
}
