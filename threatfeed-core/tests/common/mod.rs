#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use threatfeed_core::{Alert, Destination, DestinationError, Notifier, NotifyError, PollConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct RecordingNotifier {
    available: AtomicBool,
    failing_links: Mutex<HashSet<String>>,
    panicking_links: Mutex<HashSet<String>>,
    alerts: Mutex<Vec<(Alert, Instant)>>,
    texts: Mutex<Vec<(String, Instant)>>,
}

impl RecordingNotifier {
    pub fn available() -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            failing_links: Mutex::new(HashSet::new()),
            panicking_links: Mutex::new(HashSet::new()),
            alerts: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        let notifier = Self::available();
        notifier.set_available(false);
        notifier
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_link(&self, link: &str) {
        self.failing_links.lock().unwrap().insert(link.to_owned());
    }

    pub fn panic_on_link(&self, link: &str) {
        self.panicking_links.lock().unwrap().insert(link.to_owned());
    }

    pub fn clear_failures(&self) {
        self.failing_links.lock().unwrap().clear();
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.title).collect()
    }

    pub fn alert_times(&self) -> Vec<Instant> {
        self.alerts.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn text_times(&self) -> Vec<Instant> {
        self.texts.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn resolve_destination(&self) -> Result<Destination, DestinationError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(Destination {
                id: "42".into(),
                name: "threat-alerts".into(),
                guild: Some("SOC".into()),
            })
        } else {
            Err(DestinationError::NotFound("42".into()))
        }
    }

    async fn send_alert(
        &self,
        _destination: &Destination,
        alert: &Alert,
    ) -> Result<(), NotifyError> {
        let panics = self.panicking_links.lock().unwrap().contains(&alert.link);
        if panics {
            panic!("notifier blew up on {}", alert.link);
        }
        if self.failing_links.lock().unwrap().contains(&alert.link) {
            return Err(NotifyError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".into(),
            });
        }
        self.alerts.lock().unwrap().push((alert.clone(), Instant::now()));
        Ok(())
    }

    async fn send_text(&self, _destination: &Destination, text: &str) -> Result<(), NotifyError> {
        self.texts.lock().unwrap().push((text.to_owned(), Instant::now()));
        Ok(())
    }
}

/// (guid, link, title); an empty string omits the element.
pub fn rss_feed(title: &str, items: &[(&str, &str, &str)]) -> String {
    let mut body = String::new();
    for (guid, link, item_title) in items {
        body.push_str("<item>");
        body.push_str(&format!("<title>{item_title}</title>"));
        if !link.is_empty() {
            body.push_str(&format!("<link>{link}</link>"));
        }
        if !guid.is_empty() {
            body.push_str(&format!("<guid>{guid}</guid>"));
        }
        body.push_str("<description>summary</description></item>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>{title}</title><link>http://example.com/</link><description>d</description>{body}</channel></rss>"#
    )
}

pub async fn mount_feed(server: &MockServer, route: &str, xml: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(xml),
        )
        .mount(server)
        .await;
}

pub async fn mount_default_image(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/default.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
        )
        .mount(server)
        .await;
}

pub fn test_config(server: &MockServer, send_delay: Duration) -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(50),
        send_delay,
        max_entries_per_feed: 10,
        request_timeout: Duration::from_secs(2),
        max_retries: 0,
        retry_backoff_ms: 10,
        default_image_url: format!("{}/default.png", server.uri()),
        max_image_bytes: 1024 * 1024,
    }
}
