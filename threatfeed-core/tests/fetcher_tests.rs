mod common;

use std::time::Duration;

use reqwest::Client;
use threatfeed_core::{download_image, fetch_feed, FeedSource, FetchError, ImageDownloadError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{rss_feed, test_config};

#[tokio::test]
async fn transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss_feed("T", &[("1", "http://e/1", "A")])),
        )
        .mount(&server)
        .await;

    let mut cfg = test_config(&server, Duration::from_millis(10));
    cfg.max_retries = 2;
    let source = FeedSource::new(format!("{}/feed", server.uri()));

    let entries = fetch_feed(&Client::new(), &source, &cfg).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].identifier, "1");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut cfg = test_config(&server, Duration::from_millis(10));
    cfg.max_retries = 3;
    let source = FeedSource::new(format!("{}/feed", server.uri()));

    let err = fetch_feed(&Client::new(), &source, &cfg).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(status) if status.as_u16() == 404));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn image_download_names_attachment_from_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pics/cover.gif"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a".to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/pics/cover.gif?size=large", server.uri());
    let image = download_image(&Client::new(), &url, 1024).await.unwrap();
    assert_eq!(image.filename, "image.gif");
    assert_eq!(&image.bytes[..], b"GIF89a");
}

#[tokio::test]
async fn image_download_rejects_non_ok_and_oversized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/moved.png"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/huge.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let client = Client::new();
    let err = download_image(&client, &format!("{}/moved.png", server.uri()), 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, ImageDownloadError::Status(_)));

    let err = download_image(&client, &format!("{}/huge.png", server.uri()), 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, ImageDownloadError::TooLarge { limit: 1024 }));
}
