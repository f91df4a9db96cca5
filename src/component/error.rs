//! Component failures with transient/fatal classification
//!
//! Components talking to external services (embedding endpoints, LLM servers)
//! must tell the executor whether a failure is worth retrying. A timeout or a
//! dropped connection is `Transient`; a malformed response or a bad parameter
//! is `Fatal` and is never retried.

use std::fmt;
use std::time::Duration;

/// Result type for component operations
pub type ComponentResult<T> = std::result::Result<T, ComponentError>;

/// Retry classification of a component failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentErrorKind {
    /// Retryable (network timeout, rate limit, service unavailable)
    Transient,
    /// Not retryable (bad input, defect, unrecoverable service error)
    Fatal,
}

impl fmt::Display for ComponentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// Error raised by a component (module, splitter, embedding model, generator).
#[derive(Debug)]
pub struct ComponentError {
    kind: ComponentErrorKind,
    message: String,
    retry_after: Option<Duration>,
    source: Option<anyhow::Error>,
}

impl ComponentError {
    /// Create a transient (retryable) error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ComponentErrorKind::Transient,
            message: message.into(),
            retry_after: None,
            source: None,
        }
    }

    /// Create a fatal (non-retryable) error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ComponentErrorKind::Fatal,
            message: message.into(),
            retry_after: None,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Ask the executor to wait at least `delay` before the next attempt.
    #[must_use]
    pub const fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Get the retry classification.
    #[must_use]
    pub const fn kind(&self) -> ComponentErrorKind {
        self.kind
    }

    /// Whether the executor may retry this failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, ComponentErrorKind::Transient)
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the retry-after hint, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} component error: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ComponentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| {
            let e: &(dyn std::error::Error + 'static) = e.as_ref();
            e
        })
    }
}

impl From<crate::Error> for ComponentError {
    fn from(err: crate::Error) -> Self {
        match err {
            // Keep the classification of a failed resource construction
            crate::Error::ComponentInit { source, .. } => source,
            other => Self::fatal(other.to_string()),
        }
    }
}

/// Run `future` with a deadline; an elapsed deadline is a transient failure.
///
/// # Errors
///
/// Returns a transient `ComponentError` when the deadline passes, otherwise
/// whatever `future` returns.
pub async fn with_timeout<T, F>(timeout: Duration, future: F) -> ComponentResult<T>
where
    F: std::future::Future<Output = ComponentResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(elapsed) => Err(ComponentError::transient(format!(
            "external call exceeded {}ms",
            timeout.as_millis()
        ))
        .with_source(elapsed)),
    }
}
