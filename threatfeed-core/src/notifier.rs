use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use url::Url;

use crate::error::{DestinationError, NotifyError};
use crate::feed::Entry;
use crate::image::DownloadedImage;

pub const STARTUP_NOTICE: &str =
    "🛡️ **Threat Bot Started!** Monitoring public cyber security sources...";

/// A resolved place alerts can be delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub guild: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertImage {
    Attachment(DownloadedImage),
    /// Download failed; let the chat platform fetch it.
    Url(String),
}

/// Everything a chat binding needs to render one announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub link: String,
    pub source_title: String,
    pub source_domain: String,
    pub rendered_time: String,
    pub timestamp: DateTime<Utc>,
    pub image: AlertImage,
}

impl Alert {
    pub fn for_entry(entry: &Entry, image: AlertImage) -> Self {
        let now = Utc::now();
        Self {
            title: entry.title.clone(),
            link: entry.link.clone(),
            source_title: entry.source_title.clone(),
            source_domain: source_domain(&entry.link),
            rendered_time: now.with_timezone(&Local).format("%H:%M").to_string(),
            timestamp: now,
            image,
        }
    }
}

/// Host of `link` without a `www.` prefix; empty when the link has no host.
pub fn source_domain(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|host| host.strip_prefix("www.").unwrap_or(host).to_owned())
        })
        .unwrap_or_default()
}

/// Delivery capability the poll coordinator depends on. Platform failures
/// arrive as error values, never as panics.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Look up the configured destination, from cache when possible.
    async fn resolve_destination(&self) -> Result<Destination, DestinationError>;

    async fn send_alert(
        &self,
        destination: &Destination,
        alert: &Alert,
    ) -> Result<(), NotifyError>;

    async fn send_text(&self, destination: &Destination, text: &str) -> Result<(), NotifyError>;
}
