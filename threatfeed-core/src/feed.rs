use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FetchError;

/// Label used when a feed does not declare its own title.
pub const UNKNOWN_SOURCE: &str = "Unknown Source";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FeedSource {
    pub url: String,
}

impl FeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl From<&str> for FeedSource {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaKind {
    /// `media:content`
    Content,
    Enclosure,
    /// `media:thumbnail`
    Thumbnail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaCandidate {
    pub kind: MediaKind,
    pub url: String,
    pub mime_type: Option<String>,
}

/// A normalized feed item. Only constructed through the parsing functions
/// below, which guarantee a non-empty `identifier`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub identifier: String,
    pub title: String,
    pub link: String,
    pub summary_html: String,
    pub content_html: Option<String>,
    pub media: Vec<MediaCandidate>,
    pub source_title: String,
}

impl Entry {
    pub fn from_rss_item(item: &rss::Item, source_title: &str) -> Option<Self> {
        let link = item.link().unwrap_or_default();
        let identifier = identity(item.guid().map(|guid| guid.value()), link)?;

        let mut media = Vec::new();
        collect_media_content(item.extensions(), &mut media);
        if let Some(enclosure) = item.enclosure() {
            media.push(MediaCandidate {
                kind: MediaKind::Enclosure,
                url: enclosure.url().to_owned(),
                mime_type: non_empty(enclosure.mime_type()),
            });
        }
        collect_thumbnails(item.extensions(), &mut media);

        Some(Self {
            identifier,
            title: item.title().unwrap_or_default().to_owned(),
            link: link.to_owned(),
            summary_html: item.description().unwrap_or_default().to_owned(),
            content_html: item.content().map(ToOwned::to_owned),
            media,
            source_title: source_title.to_owned(),
        })
    }

    pub fn from_atom_entry(entry: &atom_syndication::Entry, source_title: &str) -> Option<Self> {
        let link = entry
            .links()
            .iter()
            .find(|link| link.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|link| link.href())
            .unwrap_or_default();
        let identifier = identity(Some(entry.id()), link)?;

        let mut media = Vec::new();
        collect_media_content(entry.extensions(), &mut media);
        media.extend(
            entry
                .links()
                .iter()
                .filter(|link| link.rel() == "enclosure")
                .map(|link| MediaCandidate {
                    kind: MediaKind::Enclosure,
                    url: link.href().to_owned(),
                    mime_type: link.mime_type().and_then(non_empty),
                }),
        );
        collect_thumbnails(entry.extensions(), &mut media);

        Some(Self {
            identifier,
            title: entry.title().value.clone(),
            link: link.to_owned(),
            summary_html: entry
                .summary()
                .map(|text| text.value.clone())
                .unwrap_or_default(),
            content_html: entry
                .content()
                .and_then(|content| content.value())
                .map(ToOwned::to_owned),
            media,
            source_title: source_title.to_owned(),
        })
    }
}

/// Feed-native id when present, otherwise the link. `None` when neither
/// exists, in which case the entry cannot be deduplicated and is dropped.
fn identity(native_id: Option<&str>, link: &str) -> Option<String> {
    native_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| Some(link.trim()).filter(|link| !link.is_empty()))
        .map(ToOwned::to_owned)
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

/// Both `rss` and `atom_syndication` expose extensions as
/// namespace prefix -> element name -> elements.
trait MediaElement: Sized {
    fn attr(&self, name: &str) -> Option<&str>;
    fn child_elements(&self, name: &str) -> &[Self];
}

impl MediaElement for rss::extension::Extension {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs().get(name).map(String::as_str)
    }

    fn child_elements(&self, name: &str) -> &[Self] {
        self.children().get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl MediaElement for atom_syndication::extension::Extension {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs().get(name).map(String::as_str)
    }

    fn child_elements(&self, name: &str) -> &[Self] {
        self.children().get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// `media:<name>` elements, both top-level and nested in `media:group`.
fn media_elements<'a, E: MediaElement>(
    extensions: &'a BTreeMap<String, BTreeMap<String, Vec<E>>>,
    name: &str,
) -> Vec<&'a E> {
    let Some(media) = extensions.get("media") else {
        return Vec::new();
    };
    let mut elements: Vec<&E> = media.get(name).into_iter().flatten().collect();
    for group in media.get("group").into_iter().flatten() {
        elements.extend(group.child_elements(name));
    }
    elements
}

fn collect_media_content<E: MediaElement>(
    extensions: &BTreeMap<String, BTreeMap<String, Vec<E>>>,
    out: &mut Vec<MediaCandidate>,
) {
    for element in media_elements(extensions, "content") {
        if let Some(url) = element.attr("url").and_then(non_empty) {
            out.push(MediaCandidate {
                kind: MediaKind::Content,
                url,
                mime_type: element.attr("type").and_then(non_empty),
            });
        }
    }
}

fn collect_thumbnails<E: MediaElement>(
    extensions: &BTreeMap<String, BTreeMap<String, Vec<E>>>,
    out: &mut Vec<MediaCandidate>,
) {
    for element in media_elements(extensions, "thumbnail") {
        if let Some(url) = element.attr("url").and_then(non_empty) {
            out.push(MediaCandidate {
                kind: MediaKind::Thumbnail,
                url,
                mime_type: None,
            });
        }
    }
}

/// Parse an RSS or Atom document into at most `limit` entries, in feed order.
///
/// The window is applied to the raw items before identity filtering, so an
/// item without id or link still consumes one slot.
pub fn parse_feed(bytes: &[u8], limit: usize) -> Result<Vec<Entry>, FetchError> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => {
            let title = source_title(channel.title());
            Ok(keep_identified(
                channel
                    .items()
                    .iter()
                    .take(limit)
                    .map(|item| Entry::from_rss_item(item, &title)),
            ))
        }
        Err(rss_err) => {
            let feed = match atom_syndication::Feed::read_from(bytes) {
                Ok(feed) => feed,
                Err(atom_err) => {
                    debug!(error = %atom_err, "document is not atom either");
                    return Err(FetchError::Rss(rss_err));
                }
            };
            let title = source_title(&feed.title().value);
            Ok(keep_identified(
                feed.entries()
                    .iter()
                    .take(limit)
                    .map(|entry| Entry::from_atom_entry(entry, &title)),
            ))
        }
    }
}

fn source_title(declared: &str) -> String {
    non_empty(declared).unwrap_or_else(|| UNKNOWN_SOURCE.to_owned())
}

fn keep_identified(entries: impl Iterator<Item = Option<Entry>>) -> Vec<Entry> {
    entries
        .filter_map(|entry| {
            if entry.is_none() {
                debug!("skipping entry without id or link");
            }
            entry
        })
        .collect()
}
