use thiserror::Error;

/// Terminal failure of one fetch task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("run cancelled before the task completed")]
    Cancelled,
}

impl FetchError {
    /// Timeouts, 5xx and connection failures are worth another attempt.
    /// 429 is transient too but is budgeted separately by the Fetcher.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionFailed(_) => true,
            Self::HttpStatus(code) => *code >= 500 || *code == 429,
            Self::Cancelled => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::HttpStatus(429))
    }

    /// Short label used for run-summary counters.
    pub fn kind(&self) -> String {
        match self {
            Self::Timeout => "timeout".to_string(),
            Self::HttpStatus(code) => format!("http_{code}"),
            Self::ConnectionFailed(_) => "connection_failed".to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no extraction strategy matched")]
    NoStrategyMatched,

    #[error("page cannot yield minimum fields: {0}")]
    MalformedMinimumFields(String),
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoStrategyMatched => "no_strategy_matched",
            Self::MalformedMinimumFields(_) => "malformed_minimum_fields",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    /// No signal is present, or every present signal carries zero weight.
    #[error("no signals present to score")]
    NoSignalsPresent,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("write conflict on {key}: existing entry kept")]
    WriteConflict { key: String },

    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
