//! Typed error hierarchy for sketch builds.
//!
//! Every way a compile or upload request can fail is a `BuildError` variant,
//! so the HTTP layer maps failures to responses in one place.

use axum::http::StatusCode;
use thiserror::Error;

/// Shown when `arduino-cli` exits non-zero without printing anything.
pub const COMPILE_FAILED: &str = "Compilation failed";
pub const UPLOAD_FAILED: &str = "Upload failed";
pub const BOARD_LIST_FAILED: &str = "Failed to find Arduino boards";
pub const NO_BOARD_DETECTED: &str =
    "No Arduino board detected. Please connect your board to the computer.";
pub const MISSING_FIELDS: &str = "Missing code or board type";

/// Errors from a single compile or upload request.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Failed to stage sketch at {path}: {source}")]
    Staging {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    CompileFailed(String),

    #[error("{0}")]
    BoardListFailed(String),

    #[error("No Arduino board detected. Please connect your board to the computer.")]
    NoBoardDetected,

    #[error("{0}")]
    UploadFailed(String),
}

impl BuildError {
    /// HTTP status for this failure. Tool failures are reported as a
    /// successful exchange carrying `success: false`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BuildError::Validation(_) => StatusCode::BAD_REQUEST,
            BuildError::Staging { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            BuildError::CompileFailed(_)
            | BuildError::BoardListFailed(_)
            | BuildError::NoBoardDetected
            | BuildError::UploadFailed(_) => StatusCode::OK,
        }
    }

    /// Message placed in the `errors` field of the response body.
    pub fn user_message(&self) -> String {
        match self {
            BuildError::Validation(msg) => msg.clone(),
            BuildError::Staging { .. } => "Failed to prepare sketch workspace".to_string(),
            other => other.to_string(),
        }
    }
}

/// Pick the most useful diagnostic from a failed tool run: stderr, then
/// stdout, then `fallback`.
pub fn diagnostic_message(stderr: &str, stdout: &str, fallback: &str) -> String {
    if !stderr.is_empty() {
        stderr.to_string()
    } else if !stdout.is_empty() {
        stdout.to_string()
    } else {
        fallback.to_string()
    }
}
