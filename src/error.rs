//! Error kinds (§7). Routine failures are returned to the caller and do
//! not stop dependency handling for the remaining deps of the same task;
//! invariant violations are fatal and abort via `assert!`/`debug_assert!`
//! at the point they're detected, not through this type.

use thiserror::Error;

/// A routine, recoverable failure surfaced to the submitter.
#[derive(Debug, Error)]
pub enum Error {
    /// A dep was malformed in a way the runtime can detect locally, e.g. a
    /// remote dep whose type is not `IN` (§7).
    #[error("invalid dependency: {0}")]
    Inval(&'static str),

    /// A transport-layer failure (§7 `OTHER`), e.g. `Transport::send_*`
    /// addressing a unit the underlying channel doesn't know about.
    #[error("transport error: {0}")]
    Other(#[from] crate::transport::TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;
