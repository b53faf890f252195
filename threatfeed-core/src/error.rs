use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("discord token is not configured (set DISCORD_TOKEN)")]
    MissingToken,
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("rss parsing error: {0}")]
    Rss(#[from] rss::Error),
    #[error("atom parsing error: {0}")]
    Atom(#[from] atom_syndication::Error),
}

impl FetchError {
    /// Transport failures and server-side errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Status(status) => status.is_server_error(),
            FetchError::Rss(_) | FetchError::Atom(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageDownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("image returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat api returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("destination channel is not configured")]
    NotConfigured,
    #[error("destination channel id {0:?} is not a valid identifier")]
    Invalid(String),
    #[error("destination channel {0} was not found")]
    NotFound(String),
    #[error("missing permission to access destination channel {0}")]
    Forbidden(String),
    #[error("chat credentials were rejected")]
    Unauthorized,
    #[error("failed to resolve destination: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
