use thiserror::Error;

/// Startup configuration failures. The only errors besides store
/// initialization that may stop the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Source(#[from] config::ConfigError),
    #[error("unknown timezone '{0}'")]
    Timezone(String),
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("unknown source '{0}'")]
    UnknownSource(String),
}

/// Search adapter outcomes other than a list of records.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no search credential configured")]
    Disabled,
    #[error("search request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("search provider returned HTTP {0}")]
    Status(u16),
    #[error("unreadable search response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page enrichment disabled")]
    Disabled,
    #[error("no url to follow")]
    EmptyUrl,
    #[error("page request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("page returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("no language-model credential configured")]
    Disabled,
    #[error("language-model request failed: {0}")]
    Network(String),
    #[error("language-model API error: {0}")]
    Api(String),
    #[error("unparseable score response: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid status '{status}' (allowed: {allowed})")]
    InvalidStatus { status: String, allowed: String },
    #[error("failed to prepare storage directory: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
