//! # Shared Data Store
//!
//! A run-scoped keyed store rules use to hand values to one another without
//! holding references to each other. Reads block up to a timeout waiting
//! for a key that has not been written yet — a parallel rule may produce a
//! value a later ordered rule consumes. A key that never appears yields a
//! [`StoreTimeout`], a normal caller-visible outcome, never a hang.
//!
//! The store lives inside the [`crate::context::RunContext`] of exactly one
//! run, so values cannot leak across runs.

use crate::error::StoreTimeout;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Default read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A value handed off between rules.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// Keyed storage shared by every rule of one run. Cloning hands out another
/// handle to the same storage.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<Inner>,
}

struct Inner {
    map: Mutex<HashMap<String, StoredValue>>,
    cvar: Condvar,
    notify: Notify,
}

impl DataStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                map: Mutex::new(HashMap::new()),
                cvar: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Store `value` under `key`, waking any blocked readers.
    pub fn put<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        let mut map = self.inner.map.lock();
        map.insert(key.into(), Arc::new(value));
        drop(map);
        self.inner.cvar.notify_all();
        self.inner.notify.notify_waiters();
    }

    /// Read `key` without waiting.
    pub fn try_get(&self, key: &str) -> Option<StoredValue> {
        self.inner.map.lock().get(key).cloned()
    }

    /// Read `key`, blocking the current thread until the value appears or
    /// `timeout` elapses. For synchronous rules only.
    pub fn get_blocking(&self, key: &str, timeout: Duration) -> Result<StoredValue, StoreTimeout> {
        let deadline = Instant::now() + timeout;
        let mut map = self.inner.map.lock();
        loop {
            if let Some(value) = map.get(key) {
                return Ok(Arc::clone(value));
            }
            if self.inner.cvar.wait_until(&mut map, deadline).timed_out() {
                return Err(StoreTimeout {
                    key: key.to_owned(),
                    timeout,
                });
            }
        }
    }

    /// Read `key`, suspending until the value appears or `timeout` elapses.
    pub async fn get(&self, key: &str, timeout: Duration) -> Result<StoredValue, StoreTimeout> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            // Register before checking so a concurrent put cannot slip
            // between the lookup and the wait.
            notified.as_mut().enable();
            if let Some(value) = self.try_get(key) {
                return Ok(value);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(StoreTimeout {
                    key: key.to_owned(),
                    timeout,
                });
            }
        }
    }
}
