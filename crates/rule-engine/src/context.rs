//! # Run Context
//!
//! Per-run state threaded into every rule hook: the run id, the engine-wide
//! terminate flag, and the shared data store. Keeping this explicit (rather
//! than ambient process-wide state) keeps runs reentrant and testable in
//! isolation.

use crate::store::DataStore;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Identity of one `execute`/`execute_async` invocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

/// State shared by every rule of one run. Cheap to clone; all clones see
/// the same terminate flag and store.
#[derive(Clone)]
pub struct RunContext {
    run_id: RunId,
    terminated: Arc<AtomicBool>,
    store: DataStore,
}

impl RunContext {
    pub(crate) fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            terminated: Arc::new(AtomicBool::new(false)),
            store: DataStore::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Whether any rule in this run has requested termination. Once true it
    /// stays true; only future `can_invoke` checks are affected, in-flight
    /// rule bodies are never interrupted.
    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    /// The run's shared data store.
    pub fn store(&self) -> &DataStore {
        &self.store
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("terminated", &self.terminated())
            .finish()
    }
}

/// Handle to the model shared by asynchronous rules.
///
/// The engine owns the model; hooks receive this handle and take the lock
/// only for as long as they touch the model. Rules must not stash clones
/// beyond the hook call — the engine reclaims the model when the run ends.
pub struct SharedModel<M> {
    inner: Arc<RwLock<M>>,
}

impl<M> SharedModel<M> {
    pub(crate) fn new(model: M) -> Self {
        Self {
            inner: Arc::new(RwLock::new(model)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, M> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, M> {
        self.inner.write().await
    }

    pub(crate) fn try_into_inner(self) -> Option<M> {
        Arc::into_inner(self.inner).map(RwLock::into_inner)
    }
}

impl<M> Clone for SharedModel<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
