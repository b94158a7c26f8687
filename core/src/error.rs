use thiserror::Error;

/// Errors surfaced by the search core.
///
/// Lookups that find nothing are not errors: unknown terms and documents yield empty
/// postings. Only arguments rejected before any work begins, and snapshot I/O, reach the caller.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl SearchError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        SearchError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
