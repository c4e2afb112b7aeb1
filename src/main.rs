mod config;
mod lemmy;
mod logging;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use lemmy::{LemmyApi, LemmyClient};
use std::path::PathBuf;
use sync::{Scheduler, SyncEngine};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "lemmy-sync")]
#[command(about = "Incrementally archive Lemmy communities into JSONL files")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./lemmy-sync.yaml or $XDG_CONFIG_HOME/lemmy-sync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log at debug level unless RUST_LOG is set
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
  /// Sync forever, sleeping `sync_interval` hours between cycles (default)
  Run,
  /// Run a single sync cycle and exit
  Once,
  /// Check that the instance and every configured community are reachable
  Check,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(args.verbose, config.log_dir.as_deref())?;

  let client = LemmyClient::new(&config)?;

  match args.command.unwrap_or(Command::Run) {
    Command::Run => {
      let (tx, rx) = watch::channel(false);
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("Interrupt received, stopping after the current cycle (Ctrl-C again to quit now)");
          let _ = tx.send(true);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("Second interrupt received, exiting");
          std::process::exit(130);
        }
      });

      info!(
        base_url = %config.base_url,
        communities = config.communities.len(),
        "Starting lemmy-sync"
      );
      let interval = config.sync_interval();
      let mut scheduler = Scheduler::new(SyncEngine::new(client, config), interval, rx);
      scheduler.run().await;
    }
    Command::Once => {
      let engine = SyncEngine::new(client, config);
      let report = engine.run_cycle().await;
      if report.failures() > 0 {
        return Err(eyre!(
          "{} of {} communities failed to sync",
          report.failures(),
          report.communities.len()
        ));
      }
    }
    Command::Check => check(&client, &config).await?,
  }

  Ok(())
}

/// Fetch site info and every configured community once.
///
/// Requests issued before a failure are still flushed to the request log.
async fn check<A: LemmyApi>(api: &A, config: &config::Config) -> Result<()> {
  let result = check_remote(api, config).await;

  match api.flush_request_log(&config.requests_file) {
    Ok(flushed) => info!(requests = flushed, "Flushed request log"),
    Err(e) => warn!(error = %e, "Failed to flush request log"),
  }

  result?;
  info!("Check complete");
  Ok(())
}

async fn check_remote<A: LemmyApi>(api: &A, config: &config::Config) -> Result<()> {
  let site = api.site().await?;
  info!(
    site = site.site_view.as_ref().map(|v| v.site.name.as_str()).unwrap_or("?"),
    version = site.version.as_deref().unwrap_or("?"),
    "Connected to {}",
    config.base_url
  );

  for name in &config.communities {
    let community = api.community(name).await?.community_view;
    info!(
      community = %name,
      title = community.community.title.as_deref().unwrap_or(&community.community.name),
      subscribers = community.counts.subscribers,
      posts = community.counts.posts,
      "Community reachable"
    );
  }

  Ok(())
}
