use thiserror::Error;

/// Failure to retrieve a page. Recovered per item by the scanner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Blocked by {url} after {attempts} attempts")]
    Blocked { url: String, attempts: u32 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },
}

impl FetchError {
    /// Network and timeout failures count towards "site unreachable".
    pub fn is_connectivity(&self) -> bool {
        matches!(self, FetchError::Network { .. } | FetchError::Timeout { .. })
    }
}

/// Failure to turn a listing page into a record. Recovered per item.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("No sale price found")]
    MissingPrice,

    #[error("No plausible rent found")]
    MissingRent,

    #[error("Implausible gross yield: {gross_yield_pct}%")]
    ImplausibleYield { gross_yield_pct: f64 },

    #[error("Malformed listing page: {message}")]
    Malformed { message: String },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Corrupt cache file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Listing site unreachable: {message}")]
    Unreachable { message: String },

    #[error("Invalid search URL {url}: {message}")]
    InvalidSearchUrl { url: String, message: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Advisory service not configured: {0}")]
    NotConfigured(String),

    #[error("Advisory request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Advisory service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Advisory service returned no content")]
    EmptyResponse,

    /// The text is kept so it can still be stored.
    #[error("Advice is missing its {tag} line")]
    Format { tag: String, body: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Advisor error: {0}")]
    Advisor(#[from] AdvisorError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {resource}")]
    NotFound { resource: String },
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
