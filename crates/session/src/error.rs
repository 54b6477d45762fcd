/// Errors from the session bootstrap collaborators.
///
/// None of these reach the host: the bootstrap always settles on a route.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("profile check failed with status {status}")]
    ProfileCheckFailed { status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile check timed out")]
    Timeout,
}
