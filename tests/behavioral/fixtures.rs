// ABOUTME: Shared test fixtures for behavioral tests
//
// Provides:
// - CountingFactory: ModelSessionFactory wrapper counting factory invocations
// - fast_settings(): session settings with short tick and close timeouts
// - new_pool(): pool with a started system session

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use statepool::config::SessionSettings;
use statepool::state_pool::{
    ModelSession, ModelSessionFactory, SessionFactory, SessionResult, StatePool,
};

pub const SYSTEM_MODEL: &str = "controller";

/// Factory that counts how often the pool asked for a session
pub struct CountingFactory {
    inner: ModelSessionFactory,
    calls: AtomicUsize,
}

impl CountingFactory {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            inner: ModelSessionFactory::new(settings),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of create calls so far, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionFactory for CountingFactory {
    type Session = ModelSession;

    async fn create(&self, key: &str) -> SessionResult<ModelSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create(key).await
    }
}

/// Settings that keep worker shutdown fast
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        tick_interval: Duration::from_millis(10),
        close_timeout: Duration::from_secs(2),
        ..SessionSettings::default()
    }
}

/// Pool over a started system session, using the given settings
///
/// Must be called from within a tokio runtime.
pub fn pool_with(settings: SessionSettings) -> StatePool<CountingFactory> {
    let system = ModelSession::start(SYSTEM_MODEL, &settings).expect("system session should start");
    StatePool::new(Arc::new(system), CountingFactory::new(settings))
}

/// Pool with fast settings
pub fn new_pool() -> StatePool<CountingFactory> {
    pool_with(fast_settings())
}
