//! Error types for pool operations

/// Errors from pool operations.
///
/// Everything except `Store` is structural: returned synchronously from the
/// mutating call and never retried. Probe failures are not errors at this
/// level; they are reported per credential inside a refresh report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential already present in pool")]
    DuplicateCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential not found: {0}")]
    UnknownCredential(String),

    #[error("cannot remove the last credential in the pool")]
    PoolWouldBeEmpty,

    #[error("cannot remove active credential {0}: no valid successor, select another credential first")]
    CannotRemoveActive(String),

    #[error("index {index} out of range for pool of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("pool has no credentials")]
    PoolEmpty,

    #[error("all credentials exhausted")]
    AllExhausted,

    #[error("endpoint already present: {0}")]
    DuplicateEndpoint(String),

    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),

    #[error("endpoint not found: {0}")]
    UnknownEndpoint(String),

    #[error("cannot remove the only endpoint: {0}")]
    EndpointSetWouldBeEmpty(String),

    #[error("pool store error: {0}")]
    Store(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
