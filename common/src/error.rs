use thiserror::Error;

/// Failures surfaced by the device driver. Both variants are transient:
/// the reconciler retries with backoff and the next tick is the fallback.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("device unreachable: {0}")]
    Unreachable(String),
    #[error("command rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed between read and write. Callers re-read and
    /// recompute; they never overwrite blindly.
    #[error("control state revision conflict")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
}
