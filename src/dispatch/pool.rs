//! Bounded worker pool for handler invocations
//!
//! One pool per transport client. Concurrency is capped by a semaphore rather
//! than growing a thread per handler; submissions past the cap queue until a
//! permit frees up. Shutdown drains in-flight work up to a caller-supplied
//! timeout — the force path simply skips draining.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    semaphore: Arc<Semaphore>,
    active: AtomicUsize,
    drained: Notify,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
                active: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Submit one unit of work. Never blocks the caller: the task itself
    /// waits for a concurrency permit, so work submitted from inside a
    /// running task (error routing) cannot deadlock the pool.
    pub fn submit(&self, work: impl Future<Output = ()> + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        inner.active.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            let _permit = Arc::clone(&inner.semaphore)
                .acquire_owned()
                .await
                .expect("worker pool semaphore closed");
            work.await;
            if inner.active.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.drained.notify_one();
            }
        });
    }

    /// Number of submitted tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Wait for in-flight work to finish, up to `timeout`. Returns `true`
    /// when the pool drained fully; on `false` the remaining tasks keep
    /// running detached.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.inner.active.load(Ordering::Acquire) > 0 {
                self.inner.drained.notified().await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}
