//! Error types.

/// Result type for cache store operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache store and entry errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored response is not a readable cache entry.
    #[error("invalid cache entry: {0}")]
    InvalidEntry(String),

    /// Unknown `x-edge-cache-status` value.
    #[error("unknown cache status: {0}")]
    UnknownStatus(String),
}

/// Failure to get any response from the origin.
///
/// An origin that answers with a 5xx status is not an error; this is for
/// transport-level failures the host could not turn into a response.
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    /// Could not reach the origin.
    #[error("origin unreachable: {0}")]
    Unreachable(String),

    /// Origin did not answer in time.
    #[error("origin timed out")]
    Timeout,
}

/// Errors returned to the host by the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum SwrError {
    /// The origin failed and no stale entry could stand in for it.
    #[error("origin request failed: {0}")]
    Origin(#[from] OriginError),
}
