//! Classified failures.
//!
//! Every failure leaving this crate carries an [`ErrorKind`]. Raw status
//! codes are never handed to callers on their own; when one was observed it
//! rides along on the [`FetchError`] for diagnostics.

use reqwest::StatusCode;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Result type used throughout the fetch API.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Closed set of failure kinds.
///
/// Only [`ErrorKind::ServiceError`] is retryable. Everything else is
/// terminal: retrying cannot change the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Generic upstream or transport failure.
    ServiceError,
    /// HTTP 429, the upstream asked us to slow down.
    TooManyRequests,
    /// HTTP 520, the upstream (or its CDN) is overloaded.
    ServiceOverloaded,
    /// A successful response whose body is not the expected JSON.
    JsonDecodeFailure,
    /// The response arrived but the expected content is absent.
    NoResults,
    /// A required attribute is missing from a parsed document.
    AttributeError,
    /// A parsed document lacks a required tag, class or id.
    HtmlParse,
    /// Content or player blocked by the upstream.
    ContentBlocked,
    /// Content withheld because of its age rating.
    AgeRestricted,
    /// The requested video quality is not offered.
    QualityNotFound,
    /// The upstream behaved in a way nothing here handles.
    UnexpectedBehavior,
    /// The caller cancelled before any worker succeeded.
    Cancelled,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 12] = [
        ErrorKind::ServiceError,
        ErrorKind::TooManyRequests,
        ErrorKind::ServiceOverloaded,
        ErrorKind::JsonDecodeFailure,
        ErrorKind::NoResults,
        ErrorKind::AttributeError,
        ErrorKind::HtmlParse,
        ErrorKind::ContentBlocked,
        ErrorKind::AgeRestricted,
        ErrorKind::QualityNotFound,
        ErrorKind::UnexpectedBehavior,
        ErrorKind::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ServiceError => "service_error",
            ErrorKind::TooManyRequests => "too_many_requests",
            ErrorKind::ServiceOverloaded => "service_overloaded",
            ErrorKind::JsonDecodeFailure => "json_decode_failure",
            ErrorKind::NoResults => "no_results",
            ErrorKind::AttributeError => "attribute_error",
            ErrorKind::HtmlParse => "html_parse",
            ErrorKind::ContentBlocked => "content_blocked",
            ErrorKind::AgeRestricted => "age_restricted",
            ErrorKind::QualityNotFound => "quality_not_found",
            ErrorKind::UnexpectedBehavior => "unexpected_behavior",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Message used when a failure is raised without one.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::ServiceError => "upstream service error",
            ErrorKind::TooManyRequests => "too many requests",
            ErrorKind::ServiceOverloaded => "upstream server is overloaded",
            ErrorKind::JsonDecodeFailure => "failed to decode the response as JSON",
            ErrorKind::NoResults => "no results",
            ErrorKind::AttributeError => "attribute not found",
            ErrorKind::HtmlParse => "tag, attribute, class or id not found",
            ErrorKind::ContentBlocked => "content or player is blocked",
            ErrorKind::AgeRestricted => "content is blocked by its age rating",
            ErrorKind::QualityNotFound => "requested video quality not found",
            ErrorKind::UnexpectedBehavior => "unexpected or unhandled upstream behavior",
            ErrorKind::Cancelled => "request cancelled",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ServiceError)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error kind: {0:?}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

/// A classified failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    kind: ErrorKind,
    message: String,
    status: Option<StatusCode>,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            kind.default_message().to_string()
        } else {
            message
        };
        Self {
            kind,
            message,
            status: None,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceError, message)
    }

    pub fn json_decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::JsonDecodeFailure, message)
    }

    pub fn no_results(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoResults, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedBehavior, message)
    }

    pub fn cancelled() -> Self {
        Self::from_kind(ErrorKind::Cancelled)
    }

    /// Attach the HTTP status that produced this failure.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Failure below the HTTP layer: connect, TLS, timeouts, body reads.
///
/// Always retryable from the engine's point of view.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}
