// ABOUTME: Background worker set owned by a model session
// ABOUTME: Spawns ticking tokio tasks and stops them cooperatively or by force

//! Worker group for model sessions.
//!
//! Every `ModelSession` owns a `WorkerGroup`: a set of named tokio tasks
//! that tick at a fixed interval until told to stop. Two stop paths exist:
//!
//! - `stop()` signals shutdown over a watch channel and waits up to a
//!   timeout, aborting any worker that is still running afterwards.
//! - `kill()` aborts every worker immediately and waits for the tasks to
//!   finish unwinding. Used for crash simulation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Snapshot of a single worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    /// Worker name
    pub name: String,
    /// Whether the task is still running
    pub alive: bool,
    /// Number of completed ticks
    pub ticks: u64,
}

struct Worker {
    name: String,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Named background tasks belonging to one model
pub struct WorkerGroup {
    /// Model key the workers belong to (for logging)
    owner: String,

    /// Interval between ticks
    tick_interval: Duration,

    /// Shutdown signal, `true` once stop has been requested
    shutdown_tx: watch::Sender<bool>,

    /// Spawned workers
    workers: Vec<Worker>,
}

impl std::fmt::Debug for WorkerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerGroup")
            .field("owner", &self.owner)
            .field("tick_interval", &self.tick_interval)
            .field("workers", &self.workers.len())
            .field("alive", &self.alive_count())
            .finish()
    }
}

impl WorkerGroup {
    /// Create an empty worker group
    pub fn new(owner: impl Into<String>, tick_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            owner: owner.into(),
            tick_interval,
            shutdown_tx,
            workers: Vec::new(),
        }
    }

    /// Spawn a named worker on the current tokio runtime
    ///
    /// Ignored once the group has been stopped.
    pub fn spawn(&mut self, name: &str) {
        if *self.shutdown_tx.borrow() {
            warn!(model = %self.owner, worker = %name, "Refusing to spawn worker on stopped group");
            return;
        }

        let ticks = Arc::new(AtomicU64::new(0));
        let shutdown_rx = self.shutdown_tx.subscribe();
        let owner = self.owner.clone();
        let worker_name = name.to_string();
        let interval = self.tick_interval;
        let worker_ticks = Arc::clone(&ticks);

        let handle = tokio::spawn(async move {
            Self::tick_loop(owner, worker_name, interval, worker_ticks, shutdown_rx).await;
        });

        debug!(model = %self.owner, worker = %name, "Worker spawned");

        self.workers.push(Worker {
            name: name.to_string(),
            ticks,
            handle: Some(handle),
        });
    }

    async fn tick_loop(
        owner: String,
        name: String,
        period: Duration,
        ticks: Arc<AtomicU64>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
                changed = shutdown_rx.changed() => {
                    // Sender dropped counts as shutdown too
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(model = %owner, worker = %name, "Worker exited");
    }

    /// Number of spawned workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker was ever spawned
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of workers still running
    pub fn alive_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_alive()).count()
    }

    /// Whether stop has been requested
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Snapshot of every worker
    pub fn info(&self) -> Vec<WorkerInfo> {
        self.workers
            .iter()
            .map(|w| WorkerInfo {
                name: w.name.clone(),
                alive: w.is_alive(),
                ticks: w.ticks.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Stop workers cooperatively
    ///
    /// Returns `true` when every worker exited within `timeout`. Workers
    /// that did not are aborted before returning `false`.
    pub async fn stop(&mut self, timeout: Duration) -> bool {
        self.shutdown_tx.send_replace(true);

        let mut clean = true;
        for worker in &mut self.workers {
            let Some(mut handle) = worker.handle.take() else {
                continue;
            };

            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!(
                    model = %self.owner,
                    worker = %worker.name,
                    timeout_ms = timeout.as_millis(),
                    "Worker did not stop in time, aborting"
                );
                handle.abort();
                let _ = handle.await;
                clean = false;
            }
        }

        info!(model = %self.owner, clean = clean, "Workers stopped");
        clean
    }

    /// Abort every worker and wait for the tasks to finish
    pub async fn kill(&mut self) {
        self.shutdown_tx.send_replace(true);

        let mut killed = 0usize;
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                handle.abort();
                let _ = handle.await;
                killed += 1;
            }
        }

        info!(model = %self.owner, killed = killed, "Workers killed");
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        for worker in &self.workers {
            if let Some(handle) = &worker.handle {
                handle.abort();
            }
        }
    }
}
