//! Bounded pool of store sessions.
//!
//! The pool is a latch: it owns exactly `concurrency` forked sessions and a semaphore
//! with as many permits. Callers wait for a permit, receive a refreshed session in a
//! [`PooledSession`] guard, and the guard hands the session back when it is dropped,
//! whether the operation returned, failed or panicked.
//!
//! # Example
//!
//! ```ignore
//! use latchdb::pool::SessionPool;
//!
//! let pool = SessionPool::from_session(base_session, 16)?;
//! let count = pool
//!     .with_session(|session| async move { session.count("car", doc! {}).await })
//!     .await?;
//! ```

use futures::FutureExt;
use mea::semaphore::{Semaphore, SemaphorePermit};
use parking_lot::Mutex;
use std::{
    fmt,
    future::Future,
    ops::{Deref, DerefMut},
    panic::{AssertUnwindSafe, resume_unwind},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    backend::{SessionOptions, StoreBackend, StoreBackendBuilder},
    error::{DataAccessError, DataResult},
    stack::report_panic,
};

/// A fixed-capacity pool of store sessions.
pub struct SessionPool<B: StoreBackend> {
    /// The dialed session every pooled session was forked from.
    base: B,
    /// Sessions not currently checked out.
    idle: Mutex<Vec<B>>,
    latch: Semaphore,
    concurrency: usize,
    in_use: AtomicUsize,
}

impl<B: StoreBackend> SessionPool<B> {
    /// Dials the store through `builder` and fills the pool with `concurrency` sessions.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::Initialization`] when the store cannot be reached and
    /// [`DataAccessError::Configuration`] when `concurrency` is zero.
    pub async fn connect<T>(
        builder: T,
        options: &SessionOptions,
        concurrency: usize,
    ) -> DataResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        let base = builder.build(options).await?;

        Self::from_session(base, concurrency)
    }

    /// Fills a pool with `concurrency` forks of an already dialed session.
    pub fn from_session(base: B, concurrency: usize) -> DataResult<Self> {
        if concurrency == 0 {
            return Err(DataAccessError::Configuration(
                "pool concurrency must be at least 1".to_string(),
            ));
        }

        let idle = (0..concurrency)
            .map(|_| base.fork())
            .collect::<Vec<_>>();

        info!(concurrency, "session pool ready");

        Ok(Self {
            base,
            idle: Mutex::new(idle),
            latch: Semaphore::new(concurrency),
            concurrency,
            in_use: AtomicUsize::new(0),
        })
    }

    /// The configured number of sessions.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of sessions currently waiting in the pool.
    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of sessions currently checked out.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Waits until a session is free and checks it out.
    ///
    /// There is no deadline: if every session is held forever, this waits forever.
    /// Use [`SessionPool::acquire_timeout`] to bound the wait.
    pub async fn acquire(&self) -> PooledSession<'_, B> {
        let permit = self.latch.acquire(1).await;

        self.checkout(permit)
    }

    /// Waits at most `deadline` for a free session.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::AcquireTimeout`] when no session was released in time.
    pub async fn acquire_timeout(&self, deadline: Duration) -> DataResult<PooledSession<'_, B>> {
        match tokio::time::timeout(deadline, self.latch.acquire(1)).await {
            Ok(permit) => Ok(self.checkout(permit)),
            Err(_) => {
                warn!(?deadline, concurrency = self.concurrency, "timed out waiting for a session");
                Err(DataAccessError::AcquireTimeout(deadline))
            }
        }
    }

    /// Runs `op` with a refreshed session and returns exactly what it produced.
    ///
    /// The session goes back to the pool when `op`'s future completes. If it panics,
    /// the panic is logged, the session is returned, and the panic resumes.
    pub async fn with_session<'p, F, Fut, T>(&'p self, op: F) -> T
    where
        F: FnOnce(PooledSession<'p, B>) -> Fut,
        Fut: Future<Output = T>,
    {
        let session = self.acquire().await;

        run_reported(op(session)).await
    }

    /// Like [`SessionPool::with_session`], but gives up waiting after `deadline`.
    pub async fn with_session_timeout<'p, F, Fut, T>(
        &'p self,
        deadline: Duration,
        op: F,
    ) -> DataResult<T>
    where
        F: FnOnce(PooledSession<'p, B>) -> Fut,
        Fut: Future<Output = T>,
    {
        let session = self.acquire_timeout(deadline).await?;

        Ok(run_reported(op(session)).await)
    }

    /// Closes every pooled session and then the base session.
    pub async fn shutdown(self) -> DataResult<()> {
        let idle = self.idle.into_inner();
        debug!(sessions = idle.len(), "closing pooled sessions");
        drop(idle);

        self.base.shutdown().await
    }

    fn checkout<'p>(&'p self, permit: SemaphorePermit<'p>) -> PooledSession<'p, B> {
        let session = self.idle.lock().pop();
        let mut session = match session {
            Some(session) => session,
            None => {
                debug!("permit granted with no idle session, forking a replacement");
                self.base.fork()
            }
        };

        session.refresh();
        self.in_use.fetch_add(1, Ordering::SeqCst);

        PooledSession {
            session: Some(session),
            pool: self,
            _permit: permit,
        }
    }

    fn checkin(&self, session: B) {
        self.idle.lock().push(session);
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<B: StoreBackend> fmt::Debug for SessionPool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("concurrency", &self.concurrency)
            .field("available", &self.available())
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// A session checked out of a [`SessionPool`].
///
/// Dereferences to the backend session. Dropping the guard returns the session and
/// then releases the permit.
pub struct PooledSession<'p, B: StoreBackend> {
    session: Option<B>,
    pool: &'p SessionPool<B>,
    // Declared last so the permit is released after the session is back in the pool.
    _permit: SemaphorePermit<'p>,
}

impl<B: StoreBackend> Deref for PooledSession<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        match &self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after check-in"),
        }
    }
}

impl<B: StoreBackend> DerefMut for PooledSession<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        match &mut self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after check-in"),
        }
    }
}

impl<B: StoreBackend> Drop for PooledSession<'_, B> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.checkin(session);
        }
    }
}

async fn run_reported<Fut: Future>(op: Fut) -> Fut::Output {
    let outcome = AssertUnwindSafe(op).catch_unwind().await;

    match outcome {
        Ok(output) => output,
        Err(payload) => {
            report_panic(payload.as_ref());
            resume_unwind(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FindSpec, UpdateOutcome, UpsertOutcome};
    use async_trait::async_trait;
    use bson::Document;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Stats {
        refreshes: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        forks: AtomicUsize,
    }

    #[derive(Debug, Default)]
    struct CountingBackend {
        stats: Arc<Stats>,
    }

    impl CountingBackend {
        async fn hold(&self, duration: Duration) {
            let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(duration).await;
            self.stats.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StoreBackend for CountingBackend {
        fn fork(&self) -> Self {
            self.stats.forks.fetch_add(1, Ordering::SeqCst);
            Self { stats: self.stats.clone() }
        }

        fn refresh(&mut self) {
            self.stats.refreshes.fetch_add(1, Ordering::SeqCst);
        }

        async fn insert_one(&self, _: &str, _: Document) -> DataResult<()> {
            Ok(())
        }

        async fn find_one(&self, _: &str, _: Document) -> DataResult<Option<Document>> {
            Ok(None)
        }

        async fn find(&self, _: &str, _: Document, _: FindSpec) -> DataResult<Vec<Document>> {
            Ok(vec![])
        }

        async fn update_one(&self, _: &str, _: Document, _: Document) -> DataResult<UpdateOutcome> {
            Ok(UpdateOutcome::default())
        }

        async fn update_many(&self, _: &str, _: Document, _: Document) -> DataResult<UpdateOutcome> {
            Ok(UpdateOutcome::default())
        }

        async fn upsert_one(&self, _: &str, _: Document, _: Document) -> DataResult<UpsertOutcome> {
            Ok(UpsertOutcome::default())
        }

        async fn delete_one(&self, _: &str, _: Document) -> DataResult<u64> {
            Ok(0)
        }

        async fn delete_many(&self, _: &str, _: Document) -> DataResult<u64> {
            Ok(0)
        }

        async fn count(&self, _: &str, _: Document) -> DataResult<u64> {
            Ok(0)
        }

        async fn aggregate(&self, _: &str, _: Vec<Document>) -> DataResult<Vec<Document>> {
            Ok(vec![])
        }
    }

    fn pool(concurrency: usize) -> (SessionPool<CountingBackend>, Arc<Stats>) {
        let base = CountingBackend::default();
        let stats = base.stats.clone();

        (SessionPool::from_session(base, concurrency).unwrap(), stats)
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(matches!(
            SessionPool::from_session(CountingBackend::default(), 0),
            Err(DataAccessError::Configuration(_))
        ));
    }

    #[test]
    fn forks_one_session_per_slot() {
        let (pool, stats) = pool(4);

        assert_eq!(stats.forks.load(Ordering::SeqCst), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn refreshes_every_checkout() {
        let (pool, stats) = pool(2);

        for _ in 0..3 {
            pool.with_session(|_session| async {}).await;
        }

        assert_eq!(stats.refreshes.load(Ordering::SeqCst), 3);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn extra_caller_waits_until_a_release() {
        let (pool, _) = pool(2);

        let first = pool.acquire().await;
        let _second = pool.acquire().await;
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let third = tokio::time::timeout(Duration::from_secs(1), pool.acquire()).await;
        assert!(third.is_ok());
        assert_eq!(pool.in_use(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_operations_never_exceed_capacity() {
        let (pool, stats) = pool(3);
        let pool = Arc::new(pool);

        let tasks = (0..12)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    pool.with_session(|session| async move {
                        session.hold(Duration::from_millis(10)).await;
                    })
                    .await
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(stats.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn returns_exactly_what_the_operation_produced() {
        let (pool, _) = pool(1);

        let failed: DataResult<u64> = pool
            .with_session(|_session| async { Err(DataAccessError::no_match("car")) })
            .await;

        assert!(failed.unwrap_err().is_no_match());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn session_is_returned_when_the_operation_panics() {
        let (pool, _) = pool(1);

        let outcome = AssertUnwindSafe(pool.with_session(|_session| async {
            panic!("boom");
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn bounded_acquire_times_out() {
        let (pool, _) = pool(1);
        let _held = pool.acquire().await;

        let outcome = pool
            .with_session_timeout(Duration::from_millis(20), |_session| async { 1 })
            .await;

        assert!(matches!(outcome, Err(DataAccessError::AcquireTimeout(_))));
    }
}
