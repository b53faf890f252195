pub mod config;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod image;
pub mod notifier;
pub mod poller;
pub mod storage;

pub use config::{AppConfig, PollConfig};
pub use error::{
    ConfigError, DestinationError, FetchError, ImageDownloadError, NotifyError, PollError,
    StorageError,
};
pub use feed::{parse_feed, Entry, FeedSource, MediaCandidate, MediaKind};
pub use fetcher::fetch_feed;
pub use image::{attachment_filename, download_image, resolve_image_url, DownloadedImage};
pub use notifier::{Alert, AlertImage, Destination, Notifier, STARTUP_NOTICE};
pub use poller::{spawn_poller, CycleReport, PollCoordinator, PollState, PollerHandle};
pub use storage::{SeenRecord, SeenStore};
