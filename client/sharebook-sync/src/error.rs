/// Error types for the ShareBook sync client
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Network failure, timeout or a transient backend status (408/429/5xx)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend rejected the request (non-transient 4xx)
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// No session, or the backend rejected the credentials
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// How a caller should react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Re-invoking the operation may succeed
    Retryable,
    /// The referenced entity is gone; do not retry
    NotFound,
    /// Redirect to an authenticated context before trying again
    Unauthenticated,
    /// The request itself is wrong; retrying will not help
    Rejected,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport(_) | SyncError::Realtime(_) => ErrorKind::Retryable,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            SyncError::Backend { .. }
            | SyncError::InvalidInput(_)
            | SyncError::Decode(_)
            | SyncError::Config(_) => ErrorKind::Rejected,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    /// Map an HTTP status and body returned by the backend
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => SyncError::Unauthenticated(body),
            404 => SyncError::NotFound(body),
            406 if body.contains("PGRST116") => SyncError::NotFound(body),
            408 | 429 => SyncError::Transport(format!("{}: {}", status, body)),
            s if s >= 500 => SyncError::Transport(format!("{}: {}", status, body)),
            _ => SyncError::Backend {
                status,
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SyncError::Backend {
                status: err.status().map(|s| s.as_u16()).unwrap_or(200),
                message: format!("Failed to parse response: {}", err),
            };
        }
        match err.status() {
            Some(status) => SyncError::from_status(status.as_u16(), err.to_string()),
            None => SyncError::Transport(err.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Realtime(err.to_string())
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Success flag plus message, the shape every client-facing operation reports
///
/// Library operations return [`SyncResult`]. A UI converts each result at its
/// boundary with [`Respond::respond`] and one of the [`tasks`] labels, so
/// nothing past it ever sees a raw error: it shows `message`, branches on
/// `success` and uses `error_kind` to decide whether to offer a retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl<T> ApiResponse<T> {
    pub fn ok(task: &str, data: T) -> Self {
        Self {
            success: true,
            message: format!("{} successfully", task),
            data: Some(data),
            error_kind: None,
        }
    }

    pub fn failed(task: &str, err: &SyncError) -> Self {
        Self {
            success: false,
            message: format!("Error while {}", task),
            data: None,
            error_kind: Some(err.kind()),
        }
    }

    pub fn from_result(task: &str, result: SyncResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(task, data),
            Err(err) => {
                tracing::warn!(task, error = %err, "operation failed");
                Self::failed(task, &err)
            }
        }
    }
}

/// Task labels for [`ApiResponse`] messages
pub mod tasks {
    pub const GET_POSTS: &str = "getting posts";
    pub const GET_POST_DETAILS: &str = "getting post details";
    pub const SAVE_POST: &str = "creating or updating post";
    pub const REMOVE_POST: &str = "removing post";
    pub const LIKE_POST: &str = "creating post like";
    pub const UNLIKE_POST: &str = "removing post like";
    pub const TOGGLE_LIKE: &str = "updating post like";
    pub const CREATE_COMMENT: &str = "creating comment";
    pub const REMOVE_COMMENT: &str = "removing comment";
    pub const GET_NOTIFICATIONS: &str = "getting notifications";
    pub const UPDATE_NOTIFICATION: &str = "updating status notification";
    pub const REMOVE_NOTIFICATION: &str = "removing notification";
    pub const UPDATE_PROFILE: &str = "updating user";
}

/// Turn an operation's result into its [`ApiResponse`]
pub trait Respond<T> {
    fn respond(self, task: &str) -> ApiResponse<T>;
}

impl<T> Respond<T> for SyncResult<T> {
    fn respond(self, task: &str) -> ApiResponse<T> {
        ApiResponse::from_result(task, self)
    }
}
