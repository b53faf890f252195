use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use threatfeed_core::config::DiscordConfig;
use threatfeed_core::{
    Alert, AlertImage, ConfigError, Destination, DestinationError, Notifier, NotifyError,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Red used for every alert embed, RGB(227, 16, 16).
const ALERT_COLOR: u32 = 0xE3_10_10;
const MAX_TITLE_CHARS: usize = 256;

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
}

/// Notifier backed by the Discord REST API, posting as a bot user.
pub struct DiscordNotifier {
    http: Client,
    api_base_url: String,
    token: String,
    channel_id: Option<String>,
    author_label: String,
    tags: String,
    footer: String,
    resolved: RwLock<Option<Destination>>,
}

impl DiscordNotifier {
    pub fn new(http: Client, config: &DiscordConfig) -> Result<Self, ConfigError> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;
        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token,
            channel_id: config.channel_id.clone(),
            author_label: config.author_label.clone(),
            tags: config.tags.clone(),
            footer: config.footer.clone(),
            resolved: RwLock::new(None),
        })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    fn messages_url(&self, destination: &Destination) -> String {
        format!("{}/channels/{}/messages", self.api_base_url, destination.id)
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Destination, DestinationError> {
        let response = self
            .http
            .get(format!("{}/channels/{}", self.api_base_url, channel_id))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|err| DestinationError::Other(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let channel: Channel = response
                    .json()
                    .await
                    .map_err(|err| DestinationError::Other(err.to_string()))?;
                Ok(Destination {
                    name: channel.name.unwrap_or_else(|| channel.id.clone()),
                    id: channel.id,
                    guild: channel.guild_id,
                })
            }
            StatusCode::NOT_FOUND => Err(DestinationError::NotFound(channel_id.to_owned())),
            StatusCode::FORBIDDEN => Err(DestinationError::Forbidden(channel_id.to_owned())),
            StatusCode::UNAUTHORIZED => Err(DestinationError::Unauthorized),
            status => Err(DestinationError::Other(format!("HTTP {status}"))),
        }
    }

    fn embed(&self, alert: &Alert, image_url: &str) -> Value {
        let mut embed = json!({
            "title": truncate_chars(&alert.title, MAX_TITLE_CHARS),
            "color": ALERT_COLOR,
            "timestamp": alert.timestamp.to_rfc3339(),
            "author": { "name": self.author_label },
            "fields": [
                { "name": "🌐 SOURCE", "value": source_field(alert), "inline": true },
                { "name": "🕒 TIME", "value": alert.rendered_time, "inline": true },
                { "name": "🏷️ TAGS", "value": self.tags, "inline": false },
            ],
            "footer": { "text": self.footer },
            "image": { "url": image_url },
        });
        // Discord rejects an empty embed url.
        if !alert.link.is_empty() {
            embed["url"] = Value::String(alert.link.clone());
        }
        embed
    }
}

/// Linked domain when the entry has a link, else the plain feed title.
fn source_field(alert: &Alert) -> String {
    if alert.link.is_empty() {
        return alert.source_title.clone();
    }
    let label = if alert.source_domain.is_empty() {
        &alert.source_title
    } else {
        &alert.source_domain
    };
    format!("[{}]({})", label, alert.link)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}

fn image_mime(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

async fn check(response: Response) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    warn!(%status, body = %body, "discord returned non-success");
    Err(NotifyError::Status { status, body })
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn resolve_destination(&self) -> Result<Destination, DestinationError> {
        if let Some(destination) = self.resolved.read().await.clone() {
            return Ok(destination);
        }

        let channel_id = self
            .channel_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(DestinationError::NotConfigured)?;
        if channel_id.parse::<u64>().is_err() {
            return Err(DestinationError::Invalid(channel_id.to_owned()));
        }

        let destination = self.fetch_channel(channel_id).await?;
        debug!(channel = %destination.id, "caching resolved channel");
        *self.resolved.write().await = Some(destination.clone());
        Ok(destination)
    }

    async fn send_alert(
        &self,
        destination: &Destination,
        alert: &Alert,
    ) -> Result<(), NotifyError> {
        let request = self
            .http
            .post(self.messages_url(destination))
            .header("Authorization", self.authorization());

        let request = match &alert.image {
            AlertImage::Attachment(image) => {
                let payload = json!({
                    "embeds": [self.embed(alert, &format!("attachment://{}", image.filename))],
                    "attachments": [{ "id": 0, "filename": image.filename }],
                });
                let file = Part::bytes(image.bytes.to_vec())
                    .file_name(image.filename.clone())
                    .mime_str(image_mime(&image.filename))?;
                let form = Form::new()
                    .text("payload_json", serde_json::to_string(&payload)?)
                    .part("files[0]", file);
                request.multipart(form)
            }
            AlertImage::Url(url) => request.json(&json!({ "embeds": [self.embed(alert, url)] })),
        };

        check(request.send().await?).await
    }

    async fn send_text(&self, destination: &Destination, text: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.messages_url(destination))
            .header("Authorization", self.authorization())
            .json(&json!({ "content": text }))
            .send()
            .await?;
        check(response).await
    }
}
