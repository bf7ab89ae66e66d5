use std::time::Duration;

use thiserror::Error;

use crate::domain::request::RequestId;

/// Request store infrastructure failures. Anything here means the statement
/// did not run to completion; the affected-row oracle never reaches the
/// caller in that case.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
}

/// External sink failures (notification or ledger).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    #[error("sink rejected the call: {0}")]
    Rejected(String),
    #[error("sink call timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by lifecycle operations to the front end.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Bad input; the caller must re-prompt. No state was changed.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Unknown request id.
    #[error("request {0} not found")]
    NotFound(RequestId),
    /// The conditional update matched no row because the request already
    /// reached a terminal state. Must be reported to the human actor and
    /// never retried: a retry could apply a stale outcome.
    #[error("request {0} is already decided")]
    AlreadyDecided(RequestId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::{LifecycleError, StoreError};
    use crate::domain::request::RequestId;

    #[test]
    fn messages_name_the_request() {
        assert_eq!(LifecycleError::NotFound(RequestId(7)).to_string(), "request 7 not found");
        assert_eq!(
            LifecycleError::AlreadyDecided(RequestId(7)).to_string(),
            "request 7 is already decided"
        );
    }

    #[test]
    fn store_errors_convert_transparently() {
        let error: LifecycleError = StoreError::Unavailable("pool closed".to_string()).into();
        assert!(matches!(error, LifecycleError::Store(_)));
    }
}
