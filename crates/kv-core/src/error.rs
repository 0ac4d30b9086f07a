//! Engine error taxonomy.

use thiserror::Error;

/// Domain-level errors surfaced by the engine.
///
/// `write`/`read` never fail for application-level reasons other than
/// [`EngineError::NotFound`] (on read) or [`EngineError::RecordTooLarge`]
/// (on write, checked before any journal slot is claimed). Every other
/// failure is an I/O error, either fatal from [`open`](crate) or logged
/// and retried from the flusher.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("key not found")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record of {size} bytes exceeds chunk size {chunk_size}")]
    RecordTooLarge { size: usize, chunk_size: usize },
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn record_too_large_message() {
        let err = EngineError::RecordTooLarge {
            size: 100,
            chunk_size: 64,
        };
        assert_eq!(err.to_string(), "record of 100 bytes exceeds chunk size 64");
    }
}
