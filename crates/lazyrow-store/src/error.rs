use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed column or super column does not exist.
    NotFound(String),
    /// The request is malformed for the addressed data (e.g. a path that names nothing).
    InvalidRequest(String),
    /// The backend could not be reached or refused the call.
    Unavailable(String),
    Storage(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
            StoreError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}
