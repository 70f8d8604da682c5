use crate::poller::CycleReport;

/// Startup errors. Any of these ends the process before the first fetch.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("resource group and vnet name must be provided")]
    MissingTarget,
    #[error("poll interval must be at least 1 second, got {0}")]
    InvalidInterval(u64),
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure to fetch one page of peerings.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("token request failed: {0}")]
    Token(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid page payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid page link {0}")]
    InvalidLink(String),
    #[error("provider error: {0}")]
    Provider(String),
}

/// Why a poll cycle ended before the lister was exhausted.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("retrieving next page: {source}")]
    Page {
        completed: CycleReport,
        #[source]
        source: ListError,
    },
    #[error("poll cycle cancelled")]
    Cancelled(CycleReport),
}

#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("metrics output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
