use std::sync::OnceLock;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::ImageDownloadError;
use crate::feed::{Entry, MediaCandidate, MediaKind};

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];
const FALLBACK_EXTENSION: &str = "jpg";

fn img_tag() -> &'static Regex {
    static IMG_TAG: OnceLock<Regex> = OnceLock::new();
    IMG_TAG.get_or_init(|| {
        Regex::new(r#"<img[^>]+src=["'](.*?)["']"#).expect("img tag pattern is valid")
    })
}

fn looks_like_image(candidate: &MediaCandidate) -> bool {
    candidate
        .mime_type
        .as_deref()
        .is_some_and(|mime| mime.contains("image"))
        || IMAGE_EXTENSIONS
            .iter()
            .any(|ext| candidate.url.ends_with(ext))
}

fn first_image_of(entry: &Entry, kind: MediaKind) -> Option<&str> {
    entry
        .media
        .iter()
        .filter(|candidate| candidate.kind == kind)
        .find(|candidate| looks_like_image(candidate))
        .map(|candidate| candidate.url.as_str())
}

/// Pick an illustrative image for `entry`, first match wins:
/// media content, enclosures, the first thumbnail, an `<img>` tag in the
/// summary or content, and finally `default_url`. Never touches the network.
pub fn resolve_image_url(entry: &Entry, default_url: &str) -> String {
    if let Some(url) = first_image_of(entry, MediaKind::Content) {
        return url.to_owned();
    }
    if let Some(url) = first_image_of(entry, MediaKind::Enclosure) {
        return url.to_owned();
    }
    if let Some(thumbnail) = entry
        .media
        .iter()
        .find(|candidate| candidate.kind == MediaKind::Thumbnail)
    {
        return thumbnail.url.clone();
    }

    let html = format!(
        "{}{}",
        entry.summary_html,
        entry.content_html.as_deref().unwrap_or_default()
    );
    if let Some(src) = img_tag()
        .captures(&html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|src| !src.is_empty())
    {
        return src.to_owned();
    }

    default_url.to_owned()
}

/// Attachment name derived from the last path segment of `url`: the text
/// after its final dot with any query string removed, or `jpg` when that is
/// missing or longer than four characters.
pub fn attachment_filename(url: &str) -> String {
    let path = url
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let ext = segment
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 4)
        .unwrap_or(FALLBACK_EXTENSION);
    format!("image.{ext}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedImage {
    pub filename: String,
    pub bytes: Bytes,
}

/// Fetch the bytes behind `url`. Only a `200 OK` counts as success, and the
/// body is streamed so that oversized images are abandoned early.
pub async fn download_image(
    client: &Client,
    url: &str,
    max_bytes: usize,
) -> Result<DownloadedImage, ImageDownloadError> {
    let response = client.get(url).send().await?;
    if response.status() != StatusCode::OK {
        return Err(ImageDownloadError::Status(response.status()));
    }
    if response
        .content_length()
        .is_some_and(|len| len > max_bytes as u64)
    {
        return Err(ImageDownloadError::TooLarge { limit: max_bytes });
    }

    let mut body = BytesMut::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > max_bytes {
            return Err(ImageDownloadError::TooLarge { limit: max_bytes });
        }
        body.extend_from_slice(&chunk);
    }

    debug!(url, size = body.len(), "downloaded image");
    Ok(DownloadedImage {
        filename: attachment_filename(url),
        bytes: body.freeze(),
    })
}
