//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommands:
//! - `replay <FILE>` -- replay a JSON-lines vote script
//! - `serve` -- apply live events from stdin until EOF or Ctrl-C
//! - `config` -- print the resolved configuration
//! - `version` -- print build/version info

pub mod replay;
pub mod serve;

use crate::channels::{ConsoleSurface, DiscordChannel, DynSurface};
use crate::config::VoteboxConfig;
use crate::polls::spawn_sweeper;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub use replay::{
    grace_period, parse_event, parse_script, run_replay, run_replay_file, EventRunner,
    ReplayError, ReplayEvent, ScriptLine,
};
pub use serve::serve_lines;

/// Time-boxed image voting for chat channels.
#[derive(Parser, Debug)]
#[command(
    name = "votebox",
    version = env!("CARGO_PKG_VERSION"),
    about = "Votebox, time-boxed image votes for chat channels"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a JSON-lines vote script and print each outcome as JSON.
    Replay {
        /// Path to the script.
        file: PathBuf,
    },

    /// Apply events from stdin as they arrive, printing each outcome as JSON.
    ///
    /// Uses the Discord surface when DISCORD_BOT_TOKEN is set, the console
    /// surface otherwise. Expired sessions are swept in the background.
    Serve,

    /// Print the resolved configuration (secrets redacted) as JSON.
    Config,

    /// Print version, build date, and git commit information.
    Version,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Run the `replay <FILE>` subcommand.
pub async fn handle_replay(
    file: &std::path::Path,
    config: &VoteboxConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    for record in run_replay_file(file, config).await? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

/// Run the `serve` subcommand.
pub async fn handle_serve(config: &VoteboxConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runner = EventRunner::new(select_surface(config)?, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        Arc::clone(runner.store()),
        std::time::Duration::from_secs(config.sweep.interval_secs),
        grace_period(config.sweep.grace_secs),
        shutdown_rx.clone(),
    );

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(true);
        }
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = serve_lines(stdin, &runner, shutdown_rx, |record| println!("{}", record)).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Session sweeper ended abnormally");
    }
    result?;
    Ok(())
}

/// Discord when a token is configured, the console otherwise
fn select_surface(config: &VoteboxConfig) -> Result<DynSurface, Box<dyn std::error::Error>> {
    match config.discord() {
        Some(discord) => {
            info!(api_base = %discord.api_base, "Using Discord surface");
            Ok(Arc::new(DiscordChannel::new(discord)?) as DynSurface)
        }
        None => {
            info!("No Discord token configured, using console surface");
            Ok(Arc::new(ConsoleSurface::new()) as DynSurface)
        }
    }
}

/// Run the `config` subcommand.
pub fn handle_config_show(config: &VoteboxConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pretty = serde_json::to_string_pretty(&config.redacted())?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("votebox {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("VOTEBOX_BUILD_DATE"));
    println!("  Git commit: {}", env!("VOTEBOX_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}
