use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a single adapter fetch (one catalog entry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection failures, timeouts and non-success HTTP statuses.
    /// `status` is `None` when no response was received at all.
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },
    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },
    #[error("Not found: {url}")]
    NotFound { url: String },
    /// The run was cancelled while this fetch waited; not a storefront fault.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn network(url: impl Into<String>, status: Option<u16>, message: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            status,
            message: message.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Parse { .. } => "parse",
            Self::NotFound { .. } => "not_found",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Connection errors, 5xx and 429 are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { status: None, .. } => true,
            Self::Network {
                status: Some(code),
                ..
            } => *code >= 500 || *code == 429,
            Self::Parse { .. } | Self::NotFound { .. } | Self::Cancelled => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("No exchange rate for currency '{0}'")]
    UnknownCurrency(String),
    #[error("Malformed price '{0}'")]
    MalformedPrice(String),
    /// Nothing of the title survives key normalization (e.g. only "™").
    #[error("Title '{0}' has no usable characters")]
    MissingTitle(String),
}

impl NormalizeError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownCurrency(_) => "unknown_currency",
            Self::MalformedPrice(_) => "malformed_price",
            Self::MissingTitle(_) => "missing_title",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("Write conflict on '{key}': expected revision {expected}, found {found}")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl PersistError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}
