// ABOUTME: Concrete model session with background workers, and the factory that starts it
// ABOUTME: Validates model keys and builds sessions from SessionSettings

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::{Session, SessionError, SessionFactory, SessionResult};
use super::workers::{WorkerGroup, WorkerInfo};
use crate::config::SessionSettings;

lazy_static! {
    // Model names: alphanumeric start, then alphanumerics, dots, dashes, underscores
    static ref MODEL_KEY: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap();
}

/// Check a model key against the configured rules
pub fn validate_key(key: &str, require_uuid: bool) -> SessionResult<()> {
    if key.is_empty() {
        return Err(SessionError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot be empty".to_string(),
        });
    }

    if require_uuid {
        return Uuid::parse_str(key)
            .map(|_| ())
            .map_err(|e| SessionError::InvalidKey {
                key: key.to_string(),
                reason: format!("not a UUID: {e}"),
            });
    }

    if !MODEL_KEY.is_match(key) {
        return Err(SessionError::InvalidKey {
            key: key.to_string(),
            reason: "only letters, digits, '.', '-' and '_' are allowed".to_string(),
        });
    }

    Ok(())
}

/// Serializable summary of a model session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Model key
    pub model: String,
    /// Unique id of this session instance
    pub instance_id: Uuid,
    /// When the session was started
    pub created_at: DateTime<Utc>,
    /// Whether close has been called
    pub closed: bool,
    /// Worker states
    pub workers: Vec<WorkerInfo>,
}

/// Session for one model, owning its background workers
pub struct ModelSession {
    key: String,
    instance_id: Uuid,
    created_at: DateTime<Utc>,
    close_timeout: Duration,
    workers: Mutex<WorkerGroup>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("key", &self.key)
            .field("instance_id", &self.instance_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ModelSession {
    /// Validate the key and start the configured workers
    ///
    /// Must be called from within a tokio runtime. Validation happens
    /// before any worker is spawned, so a rejected key leaves nothing running.
    pub fn start(key: &str, settings: &SessionSettings) -> SessionResult<Self> {
        validate_key(key, settings.require_uuid_keys)?;

        if settings.tick_interval.is_zero() {
            return Err(SessionError::StartFailed {
                key: key.to_string(),
                reason: "tick interval must be greater than zero".to_string(),
            });
        }

        let mut workers = WorkerGroup::new(key, settings.tick_interval);
        for name in &settings.worker_names {
            workers.spawn(name);
        }

        let session = Self {
            key: key.to_string(),
            instance_id: Uuid::new_v4(),
            created_at: Utc::now(),
            close_timeout: settings.close_timeout,
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
        };

        info!(
            model = %session.key,
            instance = %session.instance_id,
            workers = settings.worker_names.len(),
            "Model session started"
        );
        Ok(session)
    }

    /// Unique id of this session instance
    pub const fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// When the session was started
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether close has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether every spawned worker is still running
    pub async fn workers_alive(&self) -> bool {
        let workers = self.workers.lock().await;
        !workers.is_empty() && workers.alive_count() == workers.len()
    }

    /// Whether no spawned worker is running any more
    pub async fn workers_dead(&self) -> bool {
        self.workers.lock().await.alive_count() == 0
    }

    /// Snapshot of the session
    pub async fn summary(&self) -> SessionSummary {
        let workers = self.workers.lock().await.info();
        SessionSummary {
            model: self.key.clone(),
            instance_id: self.instance_id,
            created_at: self.created_at,
            closed: self.is_closed(),
            workers,
        }
    }
}

impl Session for ModelSession {
    fn key(&self) -> &str {
        &self.key
    }

    async fn close(&self) -> SessionResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(model = %self.key, "Session already closed");
            return Ok(());
        }

        let clean = self.workers.lock().await.stop(self.close_timeout).await;
        if !clean {
            warn!(model = %self.key, "Session closed with aborted workers");
            return Err(SessionError::CloseTimeout {
                key: self.key.clone(),
                timeout: self.close_timeout,
            });
        }

        info!(model = %self.key, instance = %self.instance_id, "Model session closed");
        Ok(())
    }

    async fn kill_workers(&self) {
        self.workers.lock().await.kill().await;
    }
}

/// Factory producing `ModelSession`s from shared settings
#[derive(Debug, Clone, Default)]
pub struct ModelSessionFactory {
    settings: SessionSettings,
}

impl ModelSessionFactory {
    /// Create a factory using the given settings
    pub const fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }

    /// Settings applied to new sessions
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}

impl SessionFactory for ModelSessionFactory {
    type Session = ModelSession;

    async fn create(&self, key: &str) -> SessionResult<ModelSession> {
        ModelSession::start(key, &self.settings)
    }
}
