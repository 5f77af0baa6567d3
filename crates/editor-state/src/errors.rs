use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditorStoreError {
    #[error("editor state is unavailable: {0}")]
    Unavailable(String),

    #[error("unknown block: {0}")]
    UnknownBlock(String),

    #[error("unknown query {store}.{selector}")]
    UnknownQuery { store: String, selector: String },

    #[error("editor rejected the request: {0}")]
    Rejected(String),
}

impl EditorStoreError {
    /// The editor may still be booting; callers polling for a condition should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EditorStoreError::Unavailable(_))
    }
}
