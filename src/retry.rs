//! Retry-once handling for rejected credentials
//!
//! Stream sources refresh their credential on their own when the upstream
//! rejects it; the reader only has to repeat the call. There is no backoff:
//! the repeat happens immediately, and a second failure of any kind is final.
//!
//! # Example
//!
//! ```
//! use streamtail::retry::IsRetryable;
//! use streamtail::SourceError;
//!
//! assert!(SourceError::Unauthorized("token expired".into()).is_retryable());
//! assert!(!SourceError::Fatal("gone".into()).is_retryable());
//! assert!(!SourceError::Closed.is_retryable());
//! ```

use crate::error::SourceError;
use crate::source::StreamSource;
use crate::types::RawItem;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if repeating the failed call may succeed
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            // The client re-authenticates before the next call
            SourceError::Unauthorized(_) => true,
            SourceError::Fatal(_) => false,
            SourceError::Closed => false,
        }
    }
}

/// Retrieve the next item, repeating the call once if it was rejected as
/// unauthorized
///
/// A successful retry is invisible to the caller apart from a debug log. If
/// the repeated call fails too, its error is returned whatever it is.
pub async fn next_with_reauth(
    source: &mut dyn StreamSource,
    reader: &str,
) -> Result<RawItem, SourceError> {
    match source.next().await {
        Ok(item) => Ok(item),
        Err(e) if e.is_retryable() => {
            tracing::debug!(
                reader = %reader,
                error = %e,
                "Retrieval rejected as unauthorized, retrying once"
            );
            source.next().await
        }
        Err(e) => Err(e),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedSource, raw_item};

    #[tokio::test]
    async fn success_makes_a_single_call() {
        let mut source = ScriptedSource::new([Ok(raw_item("a", "1", 100))]);
        let calls = source.calls();

        let item = next_with_reauth(&mut source, "test reader").await.unwrap();

        assert_eq!(item.id, "1");
        assert_eq!(calls.get(), 1, "should only call once");
    }

    #[tokio::test]
    async fn unauthorized_then_success_is_invisible() {
        let mut source = ScriptedSource::new([
            Err(SourceError::Unauthorized("expired".into())),
            Ok(raw_item("a", "1", 100)),
        ]);
        let calls = source.calls();

        let item = next_with_reauth(&mut source, "test reader").await.unwrap();

        assert_eq!(item.id, "1");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn unauthorized_twice_is_returned() {
        let mut source = ScriptedSource::new([
            Err(SourceError::Unauthorized("expired".into())),
            Err(SourceError::Unauthorized("still expired".into())),
            Ok(raw_item("a", "1", 100)),
        ]);
        let calls = source.calls();

        let result = next_with_reauth(&mut source, "test reader").await;

        assert_eq!(
            result,
            Err(SourceError::Unauthorized("still expired".into()))
        );
        assert_eq!(calls.get(), 2, "must not retry a second time");
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let mut source = ScriptedSource::new([
            Err(SourceError::Fatal("boom".into())),
            Ok(raw_item("a", "1", 100)),
        ]);
        let calls = source.calls();

        let result = next_with_reauth(&mut source, "test reader").await;

        assert_eq!(result, Err(SourceError::Fatal("boom".into())));
        assert_eq!(calls.get(), 1, "should not retry fatal error");
    }

    #[tokio::test]
    async fn fatal_error_after_unauthorized_is_returned() {
        let mut source = ScriptedSource::new([
            Err(SourceError::Unauthorized("expired".into())),
            Err(SourceError::Closed),
        ]);

        let result = next_with_reauth(&mut source, "test reader").await;

        assert_eq!(result, Err(SourceError::Closed));
    }
}
