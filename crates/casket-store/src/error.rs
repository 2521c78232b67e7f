use casket_types::TypeError;

/// Errors surfaced by blob store operations.
///
/// "Not found" is deliberately absent: read paths report it as `Ok(None)`,
/// and delete/copy paths treat it as a no-op.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store or network failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Local I/O failure (staging files, sinks, sources).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was stopped by its caller before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// A programming-contract violation. Not retried.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A key handed to or produced by the store was malformed.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),
}

impl StoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors at the boundary of an [`ObjectTransport`](crate::ObjectTransport).
///
/// `NotFound` is distinguishable from every other failure; the store layer
/// translates it and never lets it escape as a [`StoreError`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// Result alias for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

impl From<TransportError> for StoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => StoreError::Io(e),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_become_transport_errors() {
        let err: StoreError = TransportError::Failed("503 slow down".into()).into();
        assert!(matches!(err, StoreError::Transport(ref m) if m == "503 slow down"));
    }

    #[test]
    fn transport_io_stays_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: StoreError = TransportError::Io(io).into();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn cancelled_is_its_own_kind() {
        assert!(StoreError::Cancelled.is_cancelled());
        assert!(!StoreError::Transport("x".into()).is_cancelled());
    }
}
