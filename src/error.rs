use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error taxonomy. Only `Config` is fatal; everything else is
/// handled inline by the reconciler loop and never escapes `main`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors returned by an [`crate::hcn::HcnGateway`] call. The reconciler
/// sorts these into transient, not-found, and semantic-refusal buckets
/// rather than treating every failure the same way.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure talking to the kernel; retried next cycle.
    #[error("transport error: {0}")]
    Transport(String),

    /// The object was already gone. Deletes treat this as success.
    #[error("object not found")]
    NotFound,

    /// The kernel refused the call for a reason that isn't a bug, e.g.
    /// deleting a local endpoint. Logged at debug, treated as success.
    #[error("refused: {0}")]
    Refused(String),
}
