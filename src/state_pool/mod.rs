// ABOUTME: State pool module sharing one long-lived session per model across callers
// ABOUTME: Exposes the pool, the session contract, the model session implementation and metrics

//! State pool for a multi-model controller.
//!
//! Each model gets one session that owns background workers. The pool
//! creates it lazily on first use, hands the same instance to every caller,
//! counts outstanding references and defers teardown of a removed model
//! until its last reference is released.
//!
//! The pool is generic over `SessionFactory`; `ModelSessionFactory` is the
//! implementation used by the binary.

pub mod metrics;
pub mod model_session;
pub mod pool;
pub mod session;
pub mod workers;

pub use metrics::{MetricsSnapshot, PoolMetrics};
pub use model_session::{validate_key, ModelSession, ModelSessionFactory, SessionSummary};
pub use pool::{PoolEntryInfo, PoolError, PoolReport, PoolResult, StatePool};
pub use session::{Session, SessionError, SessionFactory, SessionResult};
pub use workers::{WorkerGroup, WorkerInfo};
