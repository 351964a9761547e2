// ABOUTME: Reference-counted pool of per-model sessions for the controller
// ABOUTME: Shares one session per model, defers teardown of removed models until the last release

//! State Pool
//!
//! The `StatePool` keeps exactly one live session per model and hands the
//! same instance to every caller asking for that model:
//! - `get` creates the session on first access and counts a reference
//! - `put` releases a reference
//! - `remove` marks a model as gone, closing it once nothing holds it
//! - `close` tears down every pooled session unconditionally
//!
//! The system session is supplied at construction, lives outside the map,
//! and is never refcounted or closed by the pool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        StatePool                         │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  entries: Mutex<HashMap<String, PoolEntry>>        │  │
//! │  │     - model-a -> session, refs=2                   │  │
//! │  │     - model-b -> session, refs=0                   │  │
//! │  │     - model-c -> session, refs=1, removed          │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  ┌───────────────┐  ┌───────────────┐  ┌──────────────┐  │
//! │  │ system session│  │SessionFactory │  │ PoolMetrics  │  │
//! │  │ (not pooled)  │  │ (create once) │  │              │  │
//! │  └───────────────┘  └───────────────┘  └──────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use statepool::state_pool::{ModelSessionFactory, StatePool};
//!
//! let pool = StatePool::new(system_session, ModelSessionFactory::default());
//!
//! let session = pool.get("model-a").await?;
//! // ... use the session ...
//! pool.put("model-a").await?;
//!
//! // Model deleted: closes now, or on the last put
//! pool.remove("model-a").await?;
//!
//! // Controller shutdown
//! pool.close().await?;
//! ```
//!
//! Every operation runs under one mutex, including factory calls and
//! session closes. Creation is expected to be rare next to get/put traffic.
//! A session leaving the map is closed on its own task, so cancelling the
//! caller (for example with `tokio::time::timeout`) never skips a close.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::metrics::{MetricsSnapshot, PoolMetrics};
use super::session::{Session, SessionError, SessionFactory};

// === Pool Errors ===

/// Errors that can occur during pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// Put for a model the pool does not hold
    #[error("unable to return unknown model {0} to the pool")]
    UnknownModel(String),

    /// Get for a model that is draining after removal
    #[error("model {0} has been removed")]
    ModelRemoved(String),

    /// Put without a matching get
    #[error("state pool refcount for model {0} is already 0")]
    RefCountZero(String),

    /// Session factory failed; nothing was pooled
    #[error("failed to create session for model {key}: {source}")]
    CreateFailed {
        /// Model key
        key: String,
        /// Factory error
        #[source]
        source: SessionError,
    },

    /// Session close failed; the entry was still erased
    #[error("error closing session for model {key}: {source}")]
    CloseFailed {
        /// Model key
        key: String,
        /// Close error
        #[source]
        source: SessionError,
    },

    /// One or more sessions failed to close during pool shutdown
    #[error("{} session(s) failed to close during pool shutdown", .0.len())]
    ShutdownFailed(Vec<(String, SessionError)>),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

// === Pool Entry ===

/// A pooled session with its bookkeeping
struct PoolEntry<S> {
    session: Arc<S>,
    ref_count: usize,
    removed: bool,
}

impl<S> PoolEntry<S> {
    fn new(session: Arc<S>) -> Self {
        Self {
            session,
            ref_count: 1,
            removed: false,
        }
    }
}

/// Bookkeeping of one pooled model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolEntryInfo {
    /// Model key
    pub model: String,
    /// Outstanding references
    pub ref_count: usize,
    /// Whether removal is pending
    pub removed: bool,
}

/// Snapshot of the whole pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    /// Key of the system model
    pub system_model: String,
    /// Pooled models sorted by key
    pub entries: Vec<PoolEntryInfo>,
    /// Counters at the time of the report
    pub metrics: MetricsSnapshot,
}

// === State Pool ===

/// Pool sharing one session per model across concurrent callers
pub struct StatePool<F: SessionFactory> {
    /// Key of the system session
    system_key: String,

    /// Session owned by the controller, never closed here
    system: Arc<F::Session>,

    /// Builds sessions on first access
    factory: F,

    /// Pooled sessions by model key
    entries: Mutex<HashMap<String, PoolEntry<F::Session>>>,

    /// Pool-level metrics
    metrics: Arc<PoolMetrics>,
}

impl<F: SessionFactory> std::fmt::Debug for StatePool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePool")
            .field("system_model", &self.system_key)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

impl<F: SessionFactory> StatePool<F> {
    /// Create a pool around the system session and a session factory
    pub fn new(system: Arc<F::Session>, factory: F) -> Self {
        let system_key = system.key().to_string();
        info!(system_model = %system_key, "State pool created");

        Self {
            system_key,
            system,
            factory,
            entries: Mutex::new(HashMap::new()),
            metrics: Arc::new(PoolMetrics::new()),
        }
    }

    /// Get the system session
    pub const fn system_state(&self) -> &Arc<F::Session> {
        &self.system
    }

    /// Get the key of the system session
    pub fn system_model(&self) -> &str {
        &self.system_key
    }

    /// Get the session factory
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Get pool metrics
    pub const fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    /// Get the session for a model, creating it on first access
    ///
    /// Each successful call must be matched by a `put`. The system model
    /// is returned without counting a reference.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The model has been removed and is still draining
    /// - The factory fails to create the session
    pub async fn get(&self, key: &str) -> PoolResult<Arc<F::Session>> {
        if key == self.system_key {
            return Ok(Arc::clone(&self.system));
        }

        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(key) {
            if entry.removed {
                debug!(model = %key, "Rejecting get for removed model");
                return Err(PoolError::ModelRemoved(key.to_string()));
            }

            entry.ref_count += 1;
            self.metrics.increment_gets();
            debug!(model = %key, ref_count = entry.ref_count, "Returning pooled session");
            return Ok(Arc::clone(&entry.session));
        }

        // Factory runs under the lock so a model is created at most once
        let session = match self.factory.create(key).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.metrics.create_failed();
                warn!(model = %key, error = %e, "Failed to create session");
                return Err(PoolError::CreateFailed {
                    key: key.to_string(),
                    source: e,
                });
            }
        };

        entries.insert(key.to_string(), PoolEntry::new(Arc::clone(&session)));
        self.metrics.session_created();
        self.metrics.increment_gets();
        self.update_metrics(entries.len());

        info!(model = %key, "Session created and pooled");
        Ok(session)
    }

    /// Release a reference obtained from `get`
    ///
    /// Closes the session when this was the last reference to a removed model.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The model is not in the pool
    /// - The reference count is already zero
    /// - Closing a drained removed session fails (the entry is still erased)
    pub async fn put(&self, key: &str) -> PoolResult<()> {
        if key == self.system_key {
            return Ok(());
        }

        let mut entries = self.entries.lock().await;

        let entry = entries
            .get_mut(key)
            .ok_or_else(|| PoolError::UnknownModel(key.to_string()))?;

        if entry.ref_count == 0 {
            warn!(model = %key, "Put called with refcount already at zero");
            return Err(PoolError::RefCountZero(key.to_string()));
        }

        entry.ref_count -= 1;
        self.metrics.increment_puts();
        debug!(model = %key, ref_count = entry.ref_count, "Reference released");

        if entry.ref_count > 0 || !entry.removed {
            return Ok(());
        }

        let Some(entry) = entries.remove(key) else {
            return Ok(());
        };
        self.update_metrics(entries.len());

        info!(model = %key, "Last reference to removed model released");
        Self::join_close(key, self.spawn_close(key, entry.session))
            .await
            .map_err(|source| PoolError::CloseFailed {
                key: key.to_string(),
                source,
            })
    }

    /// Mark a model as permanently gone
    ///
    /// Closes the session immediately when nothing holds it, otherwise
    /// defers the close to the last `put`. Removing a model the pool never
    /// saw, or the system model, succeeds without doing anything.
    ///
    /// # Errors
    ///
    /// Returns error if an immediate close fails (the entry is still erased).
    pub async fn remove(&self, key: &str) -> PoolResult<()> {
        if key == self.system_key {
            debug!(model = %key, "Ignoring removal of system model");
            return Ok(());
        }

        let mut entries = self.entries.lock().await;

        match entries.get_mut(key) {
            None => {
                debug!(model = %key, "Removing model that is not pooled");
                return Ok(());
            }
            Some(entry) if entry.ref_count > 0 => {
                entry.removed = true;
                info!(
                    model = %key,
                    ref_count = entry.ref_count,
                    "Model marked removed, close deferred until last put"
                );
                return Ok(());
            }
            Some(_) => {}
        }

        let Some(entry) = entries.remove(key) else {
            return Ok(());
        };
        self.update_metrics(entries.len());

        Self::join_close(key, self.spawn_close(key, entry.session))
            .await
            .map_err(|source| PoolError::CloseFailed {
                key: key.to_string(),
                source,
            })
    }

    /// Close every pooled session regardless of outstanding references
    ///
    /// The system session is left alone. The pool is empty afterwards and
    /// can be used again; later `get` calls create fresh sessions.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownFailed` listing every session whose close failed.
    /// The pool is emptied either way.
    pub async fn close(&self) -> PoolResult<()> {
        let mut entries = self.entries.lock().await;

        info!(model_count = entries.len(), "Closing state pool");

        let mut drained: Vec<(String, PoolEntry<F::Session>)> = entries.drain().collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        self.update_metrics(0);

        // Every close is in flight before the first await
        let closing: Vec<_> = drained
            .into_iter()
            .map(|(key, entry)| {
                if entry.ref_count > 0 {
                    debug!(model = %key, ref_count = entry.ref_count, "Closing session still referenced");
                }
                let handle = self.spawn_close(&key, entry.session);
                (key, handle)
            })
            .collect();

        let mut failures = Vec::new();
        for (key, handle) in closing {
            if let Err(e) = Self::join_close(&key, handle).await {
                failures.push((key, e));
            }
        }

        if !failures.is_empty() {
            return Err(PoolError::ShutdownFailed(failures));
        }

        info!("State pool closed");
        Ok(())
    }

    /// Forcibly stop the workers of every pooled session
    ///
    /// Leaves entries, reference counts and removal flags untouched. The
    /// system session's workers are stopped too when `include_system` is set.
    pub async fn kill_workers(&self, include_system: bool) {
        let entries = self.entries.lock().await;

        warn!(
            model_count = entries.len(),
            include_system = include_system,
            "Killing session workers"
        );

        for (key, entry) in entries.iter() {
            entry.session.kill_workers().await;
            debug!(model = %key, "Workers killed");
        }

        if include_system {
            self.system.kill_workers().await;
            debug!(model = %self.system_key, "System workers killed");
        }
    }

    /// Number of pooled models (the system model is not counted)
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Check if no model is pooled
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Bookkeeping for a single model, if pooled
    pub async fn entry_info(&self, key: &str) -> Option<PoolEntryInfo> {
        let entries = self.entries.lock().await;
        entries.get(key).map(|entry| PoolEntryInfo {
            model: key.to_string(),
            ref_count: entry.ref_count,
            removed: entry.removed,
        })
    }

    /// Snapshot of every pooled model and the pool counters
    pub async fn report(&self) -> PoolReport {
        let entries = self.entries.lock().await;

        let mut infos: Vec<PoolEntryInfo> = entries
            .iter()
            .map(|(key, entry)| PoolEntryInfo {
                model: key.clone(),
                ref_count: entry.ref_count,
                removed: entry.removed,
            })
            .collect();
        infos.sort_by(|a, b| a.model.cmp(&b.model));

        PoolReport {
            system_model: self.system_key.clone(),
            entries: infos,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Close a session that has already left the map
    ///
    /// The close runs on its own task and completes even when the caller's
    /// future is dropped.
    fn spawn_close(
        &self,
        key: &str,
        session: Arc<F::Session>,
    ) -> JoinHandle<Result<(), SessionError>> {
        let key = key.to_string();
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            let result = session.close().await;
            metrics.session_closed(result.is_err());

            match &result {
                Ok(()) => info!(model = %key, "Session closed"),
                Err(e) => error!(model = %key, error = %e, "Error closing session"),
            }

            result
        })
    }

    /// Wait for a close started by `spawn_close`
    async fn join_close(
        key: &str,
        handle: JoinHandle<Result<(), SessionError>>,
    ) -> Result<(), SessionError> {
        handle.await.unwrap_or_else(|e| {
            Err(SessionError::CloseFailed {
                key: key.to_string(),
                reason: format!("close task failed: {e}"),
            })
        })
    }

    /// Update pool metrics based on current state
    fn update_metrics(&self, active: usize) {
        self.metrics
            .set_active_models(u32::try_from(active).unwrap_or(u32::MAX));
    }
}
