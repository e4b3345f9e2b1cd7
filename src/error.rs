use thiserror::Error;

/// Failure while pulling elements out of a JSON array with
/// [`ArrayStream`](crate::ArrayStream).
///
/// Running out of input is not an error: a missing key or a document that
/// ends mid-element simply ends the sequence.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON element at byte {offset}: {source}")]
    Malformed {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected ',' or ']' at byte {offset}, found {found:?}")]
    UnexpectedByte { offset: u64, found: char },
}

impl StreamError {
    /// Whether the error points at bad input rather than a failed read.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, StreamError::Io(_))
    }
}
