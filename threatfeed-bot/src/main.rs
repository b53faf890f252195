use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::{redirect, ClientBuilder};
use threatfeed_bot::logging::init_tracing;
use threatfeed_bot::DiscordNotifier;
use threatfeed_core::{spawn_poller, AppConfig, PollCoordinator, SeenStore};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "threatfeed",
    about = "Posts new cyber security feed entries to Discord"
)]
struct Cli {
    /// Path to a JSON config file. Defaults to ~/.config/threatfeed/config.json when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let store = SeenStore::initialize(&config.storage.database_path)
        .await
        .with_context(|| {
            format!(
                "failed to open seen store at {}",
                config.storage.database_path.display()
            )
        })?;

    let poll_config = config.poll_config();
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(concat!("threatfeed/", env!("CARGO_PKG_VERSION")))
        .timeout(poll_config.request_timeout + Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;
    let notifier = Arc::new(DiscordNotifier::new(client.clone(), &config.discord)?);

    let mut coordinator = PollCoordinator::new(
        config.feeds.sources.clone(),
        poll_config,
        client,
        store.clone(),
        notifier,
    );

    info!(
        sources = config.feeds.sources.len(),
        interval_secs = config.schedule.poll_interval_seconds,
        "starting threat feed watcher"
    );

    if cli.once {
        let report = coordinator.run_cycle().await;
        info!(
            delivered = report.delivered.len(),
            dry_run = report.dry_run,
            "single cycle finished"
        );
        store.close().await;
        return Ok(());
    }

    let handle = spawn_poller(coordinator);
    shutdown_signal().await;
    info!("shutdown requested");
    handle.stop().await.context("poller did not stop cleanly")?;
    store.close().await;
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
