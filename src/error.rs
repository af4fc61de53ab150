#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Database error")]
    Database(#[from] sqlx::error::Error),

    #[error("Transport failure")]
    Transport(#[from] reqwest::Error),

    #[error("robots.txt denies {url} to user agent [{user_agent}]")]
    PermissionDenied { url: String, user_agent: String },

    #[error("Failed to read robots.txt: {0}")]
    Robots(String),

    #[error("No results table found on page {0}")]
    MissingResultsTable(u32),

    #[error(transparent)]
    MalformedEntry(#[from] MalformedEntry),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),
}

/// A row-group that cannot yield a valid record id. Local to one entry:
/// the crawler logs it and moves on to the next group.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEntry {
    #[error("Entry has no anchor to its result page")]
    MissingResultAnchor,

    #[error("Result anchor href {0:?} does not end in an id")]
    UnrecognizedResultHref(String),
}
