use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    /// The source document cannot be opened for incremental editing.
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Text extraction failed on page {page_index}: {reason}")]
    ExtractionError { page_index: u32, reason: String },

    /// Terminal commit failure. No bytes are produced and the edit state is kept.
    #[error("Commit failed: {0}")]
    CommitError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EditorError {
    pub fn is_parse_error(&self) -> bool {
        matches!(self, EditorError::ParseError(_))
    }

    /// Wrap any failure raised while building the output as a `CommitError`.
    pub(crate) fn into_commit_error(self) -> EditorError {
        match self {
            EditorError::CommitError(msg) => EditorError::CommitError(msg),
            other => EditorError::CommitError(other.to_string()),
        }
    }
}
