use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::PollConfig;
use crate::error::FetchError;
use crate::feed::{parse_feed, Entry, FeedSource};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Download and parse one source, returning at most
/// `config.max_entries_per_feed` entries in feed order.
///
/// Transient failures (transport errors, 5xx) are retried up to
/// `config.max_retries` times with exponential backoff. Client errors and
/// unparseable documents fail immediately.
pub async fn fetch_feed(
    client: &Client,
    source: &FeedSource,
    config: &PollConfig,
) -> Result<Vec<Entry>, FetchError> {
    let mut backoff = retry_backoff(config.retry_backoff_ms);
    let mut attempt: u8 = 0;
    loop {
        match fetch_once(client, source, config).await {
            Ok(entries) => return Ok(entries),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let Some(delay) = backoff.next_backoff() else {
                    return Err(err);
                };
                warn!(
                    feed = %source,
                    attempt = attempt + 1,
                    ?delay,
                    error = %err,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Doubling delays starting at `base_ms`, capped at one minute. The attempt
/// count alone bounds the retries.
fn retry_backoff(base_ms: u64) -> ExponentialBackoff {
    let initial = Duration::from_millis(base_ms).min(MAX_BACKOFF);
    ExponentialBackoff {
        current_interval: initial,
        initial_interval: initial,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: MAX_BACKOFF,
        max_elapsed_time: None,
        ..Default::default()
    }
}

async fn fetch_once(
    client: &Client,
    source: &FeedSource,
    config: &PollConfig,
) -> Result<Vec<Entry>, FetchError> {
    let response = client
        .get(&source.url)
        .timeout(config.request_timeout)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    let bytes = response.bytes().await?;
    let entries = parse_feed(&bytes, config.max_entries_per_feed)?;
    debug!(feed = %source, entries = entries.len(), "fetched feed");
    Ok(entries)
}
