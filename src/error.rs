use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer is closed")]
    ClosedBuffer,
    #[error("Pool is closed")]
    ClosedPool,
    #[error("Buffer is overloaded")]
    Overload,
    #[error("Buffer is empty")]
    Empty,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl BufferError {
    /// Transient conditions a caller may retry later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, BufferError::Overload | BufferError::Empty)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, BufferError::ClosedBuffer | BufferError::ClosedPool)
    }
}

pub type BufferResult<T> = Result<T, BufferError>;

/// A rejected `put`. Carries the item back to the caller alongside the reason.
#[derive(Error, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct PutError<T> {
    pub item: T,
    #[source]
    pub error: BufferError,
}

impl<T> PutError<T> {
    pub(crate) fn new(item: T, error: BufferError) -> Self {
        Self { item, error }
    }

    pub fn error(&self) -> &BufferError {
        &self.error
    }

    /// Recovers the item that could not be admitted.
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
