use http::StatusCode;
use thiserror::Error;

/// Failure of one backend call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, timeout, reset).
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered `{ success: false }`.
    #[error("{message}")]
    Application {
        code: Option<String>,
        message: String,
    },

    /// The requested record does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Non-success status without a structured error body.
    #[error("HTTP {status}")]
    Http { status: StatusCode },

    /// The response body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Parse(#[from] serde_json::Error),

    /// `api.base_url` could not be used to build request URLs.
    #[error("invalid base URL `{url}`: {reason}")]
    BaseUrl { url: String, reason: String },

    /// The caller's context went away before the response arrived.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Text for the single transient notification shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(e) if e.is_timeout() => {
                "The server took too long to answer. Try again.".to_owned()
            }
            Self::Transport(_) => "Could not reach the server. Check your connection.".to_owned(),
            Self::Application { code, message } => match code {
                Some(code) if message.is_empty() => format!("Request failed ({code})"),
                None if message.is_empty() => "Request failed.".to_owned(),
                _ => message.clone(),
            },
            Self::NotFound { what } => {
                format!("This {what} no longer exists or was never recorded.")
            }
            Self::Http { status } if *status == StatusCode::UNAUTHORIZED => {
                "Your session has expired. Sign in again.".to_owned()
            }
            Self::Http { status } if *status == StatusCode::FORBIDDEN => {
                "You do not have permission to do that.".to_owned()
            }
            Self::Http { status } => format!("Request failed (HTTP {})", status.as_u16()),
            Self::Parse(_) => "The server sent a response this client does not understand.".to_owned(),
            Self::BaseUrl { .. } => self.to_string(),
            Self::Cancelled => "Request cancelled.".to_owned(),
        }
    }
}
