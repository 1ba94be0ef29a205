use thiserror::Error;

use crate::OrderStatus;

/// Longest response body carried inside an error, in characters.
pub const BODY_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum Error {
    /// Raised by the exchange client. Always surfaced to `place_order` callers.
    #[error("Exchange API error: {0}")]
    Exchange(String),

    /// The backend refused our credentials or bearer token.
    #[error("Backend auth rejected at {url} (HTTP {status}): {body}")]
    Auth {
        url: String,
        status: u16,
        body: String,
    },

    /// The backend answered with a body that is not the structure we expect.
    #[error("Unexpected backend response from {url} (HTTP {status}): {reason}; body: {body}")]
    ResponseFormat {
        url: String,
        status: u16,
        reason: String,
        body: String,
    },

    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// Connection refused, DNS failure, TLS failure and the like.
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Configuration error: {0}")]
    Config(String),

}

impl Error {
    /// Stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Exchange(_) => "exchange",
            Error::Auth { .. } => "auth",
            Error::ResponseFormat { .. } => "response_format",
            Error::HttpStatus { .. } => "http_status",
            Error::Timeout { .. } => "timeout",
            Error::Transport { .. } => "transport",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Config(_) => "config",
        }
    }

    /// Target URL of the failed request, when the error came from one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Auth { url, .. }
            | Error::ResponseFormat { url, .. }
            | Error::HttpStatus { url, .. }
            | Error::Timeout { url }
            | Error::Transport { url, .. } => Some(url),
            _ => None,
        }
    }

    /// HTTP status of the failed response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Auth { status, .. }
            | Error::ResponseFormat { status, .. }
            | Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }
}

/// Truncate a response body for logs and error messages.
pub fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
