use casket_store::StoreError;
use casket_types::TypeError;

/// Errors from the content-addressed upload pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// The underlying store failed, or the operation was cancelled.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading the byte source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fetching a remote URI failed or returned a non-success status.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A capability produced something it must never produce.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),
}

impl AddressError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_cancelled())
    }
}

/// Result alias for content-addressing operations.
pub type AddressResult<T> = Result<T, AddressError>;

impl From<AddressError> for StoreError {
    fn from(err: AddressError) -> Self {
        match err {
            AddressError::Store(e) => e,
            AddressError::Io(e) => StoreError::Io(e),
            AddressError::InvalidKey(e) => StoreError::InvalidKey(e),
            AddressError::InvariantViolation(m) => StoreError::InvariantViolation(m),
            AddressError::Fetch(m) => StoreError::Transport(m),
        }
    }
}
