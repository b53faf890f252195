use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PollConfig;
use crate::error::{DestinationError, FetchError, PollError};
use crate::feed::{Entry, FeedSource};
use crate::fetcher::fetch_feed;
use crate::image::{download_image, resolve_image_url};
use crate::notifier::{Alert, AlertImage, Destination, Notifier, STARTUP_NOTICE};
use crate::storage::SeenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    ResolvingDestination,
    ProcessingSources,
    Sleeping,
    Stopped,
}

/// What happened during one pass over every source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// No destination could be resolved; new entries were only recorded.
    pub dry_run: bool,
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    pub recorded_without_delivery: Vec<String>,
    pub already_seen: usize,
    pub failed_sources: Vec<FeedSource>,
    pub startup_notice_sent: bool,
    pub cancelled: bool,
}

enum Flow {
    Continue,
    Cancelled,
}

/// Runs poll cycles: fetch every source, announce unseen entries, record
/// them, then sleep. Cycles never overlap; the next one is scheduled only
/// after the previous has fully completed.
pub struct PollCoordinator {
    sources: Vec<FeedSource>,
    config: PollConfig,
    client: Client,
    store: SeenStore,
    notifier: Arc<dyn Notifier>,
    startup_announced: bool,
    /// Set once the previous delivery succeeded; the next send waits
    /// `config.send_delay` first.
    send_pending_delay: bool,
    state: watch::Sender<PollState>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl PollCoordinator {
    pub fn new(
        sources: Vec<FeedSource>,
        config: PollConfig,
        client: Client,
        store: SeenStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            sources,
            config,
            client,
            store,
            notifier,
            startup_announced: false,
            send_pending_delay: false,
            state,
            shutdown: None,
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: PollState) {
        self.state.send_replace(state);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleep for `duration`. Returns `false` when shutdown was requested
    /// before or during the wait.
    async fn pause(&mut self, duration: Duration) -> bool {
        let Some(shutdown) = self.shutdown.as_mut() else {
            tokio::time::sleep(duration).await;
            return true;
        };
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = stop_signalled(shutdown) => false,
        }
    }

    /// Loop until shutdown: run a cycle, then sleep for the poll interval.
    pub async fn run(mut self) {
        loop {
            if self.shutdown_requested() {
                break;
            }
            let report = self.run_cycle().await;
            if report.cancelled {
                break;
            }

            self.set_state(PollState::Sleeping);
            debug!(interval = ?self.config.interval, "sleeping until next cycle");
            if !self.pause(self.config.interval).await {
                break;
            }
            self.set_state(PollState::Idle);
        }
        self.set_state(PollState::Stopped);
        info!("poller stopped");
    }

    /// Run exactly one cycle over every configured source.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        self.send_pending_delay = false;

        self.set_state(PollState::ResolvingDestination);
        let destination = self.resolve_destination().await;
        report.dry_run = destination.is_none();

        self.set_state(PollState::ProcessingSources);
        info!(
            sources = self.sources.len(),
            dry_run = report.dry_run,
            "checking feeds"
        );

        let sources = self.sources.clone();
        for source in &sources {
            if self.shutdown_requested() {
                report.cancelled = true;
                break;
            }

            let outcome = AssertUnwindSafe(self.process_source(
                source,
                destination.as_ref(),
                &mut report,
            ))
            .catch_unwind()
            .await;

            match outcome {
                Ok(Ok(Flow::Continue)) => {}
                Ok(Ok(Flow::Cancelled)) => {
                    report.cancelled = true;
                    break;
                }
                Ok(Err(err)) => {
                    warn!(feed = %source, error = %err, "failed to read feed");
                    report.failed_sources.push(source.clone());
                }
                Err(_) => {
                    error!(feed = %source, "feed processing panicked");
                    report.failed_sources.push(source.clone());
                }
            }
        }

        if !report.cancelled {
            if let Some(destination) = &destination {
                self.announce_startup(destination, &mut report).await;
            }
        }

        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            recorded = report.recorded_without_delivery.len(),
            already_seen = report.already_seen,
            failed_sources = report.failed_sources.len(),
            "cycle complete"
        );
        self.set_state(PollState::Idle);
        report
    }

    async fn resolve_destination(&self) -> Option<Destination> {
        match self.notifier.resolve_destination().await {
            Ok(destination) => {
                info!(
                    channel = %destination.name,
                    id = %destination.id,
                    guild = destination.guild.as_deref().unwrap_or("-"),
                    "target channel identified"
                );
                Some(destination)
            }
            Err(DestinationError::NotConfigured) => {
                warn!("destination channel not configured; running dry");
                None
            }
            Err(err) => {
                error!(error = %err, "cannot reach destination channel; running dry");
                None
            }
        }
    }

    async fn process_source(
        &mut self,
        source: &FeedSource,
        destination: Option<&Destination>,
        report: &mut CycleReport,
    ) -> Result<Flow, FetchError> {
        let entries = fetch_feed(&self.client, source, &self.config).await?;

        for entry in entries {
            if self.store.is_seen(&entry.identifier).await {
                report.already_seen += 1;
                continue;
            }

            let Some(destination) = destination else {
                self.record(&entry).await;
                report.recorded_without_delivery.push(entry.identifier);
                continue;
            };

            if !self.wait_for_send_slot().await {
                return Ok(Flow::Cancelled);
            }

            let image = self.prepare_image(&entry).await;
            let alert = Alert::for_entry(&entry, image);
            match self.notifier.send_alert(destination, &alert).await {
                Ok(()) => {
                    info!(
                        feed = %source,
                        entry = %entry.identifier,
                        title = %entry.title,
                        "alert sent"
                    );
                    self.record(&entry).await;
                    self.send_pending_delay = true;
                    report.delivered.push(entry.identifier);
                }
                Err(err) => {
                    // Left unrecorded so the next cycle retries it.
                    warn!(
                        feed = %source,
                        entry = %entry.identifier,
                        error = %err,
                        "failed to send alert"
                    );
                    report.failed.push(entry.identifier);
                }
            }
        }

        Ok(Flow::Continue)
    }

    /// Honor the inter-send delay if the previous delivery succeeded.
    async fn wait_for_send_slot(&mut self) -> bool {
        if !self.send_pending_delay {
            return true;
        }
        self.send_pending_delay = false;
        debug!(delay = ?self.config.send_delay, "waiting before next delivery");
        self.pause(self.config.send_delay).await
    }

    async fn record(&self, entry: &Entry) {
        if let Err(err) = self.store.mark_seen(&entry.identifier).await {
            error!(entry = %entry.identifier, error = %err, "failed to record entry as seen");
        }
    }

    async fn prepare_image(&self, entry: &Entry) -> AlertImage {
        let url = resolve_image_url(entry, &self.config.default_image_url);
        match download_image(&self.client, &url, self.config.max_image_bytes).await {
            Ok(image) => AlertImage::Attachment(image),
            Err(err) => {
                warn!(url = %url, error = %err, "failed to download image; sending link instead");
                AlertImage::Url(url)
            }
        }
    }

    async fn announce_startup(&mut self, destination: &Destination, report: &mut CycleReport) {
        if self.startup_announced {
            return;
        }
        self.startup_announced = true;
        info!("initial cycle complete; monitoring active");

        if !self.wait_for_send_slot().await {
            report.cancelled = true;
            return;
        }
        match self.notifier.send_text(destination, STARTUP_NOTICE).await {
            Ok(()) => {
                info!("startup notice sent");
                report.startup_notice_sent = true;
            }
            Err(err) => warn!(error = %err, "failed to send startup notice"),
        }
    }
}

/// Resolves once `true` is published or the sender is gone.
async fn stop_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Handle to a coordinator running on its own task. Dropping the handle
/// also stops the coordinator the next time it sleeps.
pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<PollState>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollState> {
        self.state_rx.clone()
    }

    /// Request shutdown and wait for the coordinator to finish. An in-flight
    /// network call is allowed to complete.
    pub async fn stop(self) -> Result<(), PollError> {
        let _ = self.shutdown_tx.send(true);
        self.join.await.map_err(PollError::from)
    }
}

pub fn spawn_poller(mut coordinator: PollCoordinator) -> PollerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    coordinator.shutdown = Some(shutdown_rx);
    let state_rx = coordinator.subscribe_state();
    let join = tokio::spawn(coordinator.run());
    PollerHandle {
        shutdown_tx,
        state_rx,
        join,
    }
}
