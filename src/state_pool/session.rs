// ABOUTME: Collaborator contract between the state pool and the sessions it manages
// ABOUTME: Defines the Session and SessionFactory traits plus the session error type

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by sessions and session factories
#[derive(Debug, Error)]
pub enum SessionError {
    /// Key rejected before any worker was started
    #[error("Invalid model key '{key}': {reason}")]
    InvalidKey {
        /// Offending key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// Session could not be started
    #[error("Failed to start session for model {key}: {reason}")]
    StartFailed {
        /// Model key
        key: String,
        /// Failure description
        reason: String,
    },

    /// Workers did not stop within the close timeout and were aborted
    #[error("Workers for model {key} did not stop within {timeout:?}")]
    CloseTimeout {
        /// Model key
        key: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Teardown failed for another reason
    #[error("Failed to close session for model {key}: {reason}")]
    CloseFailed {
        /// Model key
        key: String,
        /// Failure description
        reason: String,
    },
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// A heavyweight, worker-owning resource associated with one model key
///
/// Sessions are shared behind `Arc`, so every operation takes `&self`.
pub trait Session: Send + Sync + 'static {
    /// Key this session was created for
    fn key(&self) -> &str;

    /// Tear down the session's resources and workers
    ///
    /// Must be idempotent: closing an already closed session succeeds.
    fn close(&self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Forcibly stop the background workers without closing the session
    ///
    /// Returns once the workers have terminated.
    fn kill_workers(&self) -> impl Future<Output = ()> + Send;
}

/// Builds and starts sessions for the pool
///
/// A failed `create` must not leave workers running. Any
/// `Fn(String) -> Future<Output = SessionResult<S>>` closure is a factory.
pub trait SessionFactory: Send + Sync {
    /// Session type produced by this factory
    type Session: Session;

    /// Create and start the session for `key`
    fn create(&self, key: &str) -> impl Future<Output = SessionResult<Self::Session>> + Send;
}

impl<F, Fut, S> SessionFactory for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = SessionResult<S>> + Send,
    S: Session,
{
    type Session = S;

    fn create(&self, key: &str) -> impl Future<Output = SessionResult<S>> + Send {
        self(key.to_string())
    }
}
