//! Identity-keyed session cache with single-flight establishment and idle expiry.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::{CacheConfig, EvictionPolicy};
use crate::error::{Error, Result};
use crate::factory::{FactoryError, Session, SessionFactory};
use crate::flight::{Flight, SingleFlight, Ticket};

/// Entry stored in the cache, one per identity.
struct CacheEntry<S> {
    /// The session, absent while the first establishment is in flight.
    session: Option<Arc<S>>,

    /// Caller-interest tokens. Duplicates are allowed; removal is by value.
    callers: Vec<String>,

    /// Monotonic time of the last access, used for idle expiry.
    last_touch: Instant,

    /// Wall-clock time of the last access, for reporting.
    touched_at: DateTime<Utc>,
}

impl<S> CacheEntry<S> {
    fn new(caller: String) -> Self {
        Self {
            session: None,
            callers: vec![caller],
            last_touch: Instant::now(),
            touched_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.last_touch = Instant::now();
        self.touched_at = Utc::now();
    }

    /// Remove one occurrence of `caller`.
    fn remove_caller(&mut self, caller: &str) -> bool {
        match self.callers.iter().position(|c| c == caller) {
            Some(pos) => {
                self.callers.remove(pos);
                true
            }
            None => false,
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_touch)
    }

    fn is_evictable(&self, now: Instant, idle_timeout: Duration, policy: EvictionPolicy) -> bool {
        if self.idle_for(now) <= idle_timeout {
            return false;
        }
        match policy {
            EvictionPolicy::IdleAndUnreferenced => self.callers.is_empty(),
            EvictionPolicy::IdleOnly => true,
        }
    }
}

/// Everything guarded by the cache lock.
///
/// Entries and flights live under one lock so that "no flight for this
/// identity" and "start one" happen atomically.
struct CacheState<S> {
    entries: HashMap<String, CacheEntry<S>>,
    flights: SingleFlight<Landed<S>>,
    shut_down: bool,
}

struct CacheInner<F: SessionFactory> {
    factory: F,
    config: CacheConfig,
    state: Mutex<CacheState<F::Session>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Result of a flight: the new session for an establishment, `None` for a teardown.
type Landed<S> = Option<Arc<S>>;

/// What `acquire` does after inspecting the state.
enum AcquireStep<S> {
    Ready(Arc<S>),
    /// This caller started the establishment and is already registered.
    Establish(Flight<Landed<S>>),
    Wait(Flight<Landed<S>>),
}

/// What `release` does after inspecting the state.
enum ReleaseStep<S> {
    Wait(Flight<Landed<S>>),
    Done(Option<Flight<Landed<S>>>),
}

/// Session cache keyed by identity.
///
/// This cache provides:
/// - Single-flight establishment: concurrent callers for one identity share one
///   `establish` call and observe the same session or the same error
/// - Caller-token reference tracking with explicit release
/// - Idle expiry through an opportunistic and an optional periodic sweep
/// - Explicit shutdown that closes every session exactly once
///
/// Distinct identities never wait on each other. Sessions are only ever closed
/// by the cache, after they have been removed from it.
pub struct SessionCache<F: SessionFactory> {
    inner: Arc<CacheInner<F>>,
}

impl<F: SessionFactory> Clone for SessionCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SessionFactory> SessionCache<F> {
    /// Create a new, empty cache.
    pub fn new(factory: F, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                factory,
                config,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    flights: SingleFlight::new(),
                    shut_down: false,
                }),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get the session factory.
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Get a session for `credential`, establishing one if needed.
    ///
    /// `caller` is recorded as an interest token on the entry and should later
    /// be handed back through [`SessionCache::release`] or
    /// [`SessionCache::detach`].
    pub async fn acquire(
        &self,
        credential: &str,
        caller: impl Into<String>,
    ) -> Result<Arc<F::Session>> {
        let caller = caller.into();
        let identity = self
            .inner
            .factory
            .derive_identity(credential)
            .await
            .map_err(|e| Error::DerivationFailed(e.to_string()))?;

        loop {
            let next = {
                let mut guard = self.inner.state.lock();
                let state = &mut *guard;

                if state.shut_down {
                    return Err(Error::ShutDown);
                }

                if let Some(flight) = state.flights.get(&identity) {
                    AcquireStep::Wait(flight)
                } else {
                    let ready = state.entries.get_mut(&identity).and_then(|entry| {
                        let session = entry.session.clone()?;
                        entry.callers.push(caller.clone());
                        entry.touch();
                        Some(session)
                    });

                    match ready {
                        Some(session) => AcquireStep::Ready(session),
                        None => AcquireStep::Establish(self.inner.begin_establish(
                            state, &identity, credential, &caller,
                        )),
                    }
                }
            };

            let session = match next {
                AcquireStep::Ready(session) => {
                    trace!(identity = %identity, caller = %caller, "Session served from cache");
                    session
                }
                // The token went in with the entry; a release issued meanwhile
                // must stay in effect, so the token is not added again.
                AcquireStep::Establish(flight) => match flight.await? {
                    Some(session) => session,
                    None => continue,
                },
                AcquireStep::Wait(flight) => {
                    flight.await?;
                    continue;
                }
            };

            if self.inner.config.sweep_on_acquire {
                self.sweep_in_background();
            }
            return Ok(session);
        }
    }

    /// Drop one interest token and tear the session down if none remain.
    ///
    /// Waits for any in-flight establishment or teardown for the identity
    /// first. Releasing an identity that is not cached is a no-op.
    pub async fn release(&self, identity: &str, caller: &str) {
        {
            let mut state = self.inner.state.lock();
            match state.entries.get_mut(identity) {
                Some(entry) => {
                    if !entry.remove_caller(caller) {
                        debug!(identity = %identity, caller = %caller, "Released caller was not registered");
                    }
                }
                None => {
                    debug!(identity = %identity, caller = %caller, "Release for uncached identity ignored");
                    return;
                }
            }
        }

        loop {
            let next = {
                let mut guard = self.inner.state.lock();
                let state = &mut *guard;

                if let Some(flight) = state.flights.get(identity) {
                    ReleaseStep::Wait(flight)
                } else if state
                    .entries
                    .get(identity)
                    .is_some_and(|entry| entry.callers.is_empty())
                {
                    ReleaseStep::Done(self.inner.begin_teardown(state, identity, "released"))
                } else {
                    ReleaseStep::Done(None)
                }
            };

            match next {
                // The outcome belongs to whoever started the flight.
                ReleaseStep::Wait(flight) => {
                    let _ = flight.await;
                }
                ReleaseStep::Done(teardown) => {
                    if let Some(flight) = teardown {
                        let _ = flight.await;
                    }
                    return;
                }
            }
        }
    }

    /// Drop one interest token without tearing the session down.
    ///
    /// The entry is touched and left for the idle sweep. Returns whether the
    /// identity was cached.
    pub fn detach(&self, identity: &str, caller: &str) -> bool {
        let mut state = self.inner.state.lock();
        match state.entries.get_mut(identity) {
            Some(entry) => {
                entry.remove_caller(caller);
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Mark the entry for `identity` as recently used.
    ///
    /// Returns false (and does nothing) if the identity is not cached.
    pub fn touch(&self, identity: &str) -> bool {
        let mut state = self.inner.state.lock();
        match state.entries.get_mut(identity) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Evict idle entries, closing their sessions.
    ///
    /// Entries with an operation in flight are skipped. Returns the number of
    /// entries evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.inner.config.idle_timeout;
        let policy = self.inner.config.eviction;

        let (evicted, closing) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let expired: Vec<String> = state
                .entries
                .iter()
                .filter(|(id, _)| !state.flights.is_flying(id))
                .filter(|(_, entry)| entry.is_evictable(now, idle_timeout, policy))
                .map(|(id, _)| id.clone())
                .collect();

            let closing: Vec<_> = expired
                .iter()
                .filter_map(|id| self.inner.begin_teardown(state, id, "idle"))
                .collect();

            (expired.len(), closing)
        };

        if evicted > 0 {
            debug!(count = evicted, "Evicted idle sessions");
        }

        join_all(closing).await;
        evicted
    }

    /// Start the periodic sweep task.
    ///
    /// Does nothing when the task is disabled in the configuration. The task
    /// holds only a weak reference and stops once the cache is dropped or shut
    /// down. Returns whether a task was started.
    pub fn spawn_sweeper(&self) -> bool {
        let config = &self.inner.config;
        if !config.enable_sweep_task || config.sweep_interval.is_zero() {
            return false;
        }

        let interval = config.sweep_interval;
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SessionCache { inner }.sweep().await;
            }
        });

        if let Some(previous) = self.inner.sweeper.lock().replace(handle) {
            previous.abort();
        }
        debug!(interval_secs = interval.as_secs(), "Started session sweep task");
        true
    }

    /// Shut the cache down.
    ///
    /// Stops the sweep task, waits for in-flight operations, then closes every
    /// cached session. Later calls to [`SessionCache::acquire`] fail with
    /// [`Error::ShutDown`].
    pub async fn shutdown(&self) {
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
        }

        let in_flight = {
            let mut state = self.inner.state.lock();
            state.shut_down = true;
            state.flights.all()
        };
        join_all(in_flight).await;

        let closing = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let identities: Vec<String> = state.entries.keys().cloned().collect();
            let mut closing: Vec<_> = identities
                .iter()
                .filter_map(|id| self.inner.begin_teardown(state, id, "shutdown"))
                .collect();
            // Teardowns a concurrent sweep may have started.
            closing.extend(state.flights.all());
            closing
        };

        let count = closing.len();
        join_all(closing).await;
        info!(closed = count, "Session cache shut down");
    }

    /// Get the current number of cached entries, including ones being established.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    /// Check if an entry exists for `identity`.
    pub fn contains(&self, identity: &str) -> bool {
        self.inner.state.lock().entries.contains_key(identity)
    }

    /// Caller tokens currently registered for `identity`.
    pub fn callers(&self, identity: &str) -> Option<Vec<String>> {
        self.inner
            .state
            .lock()
            .entries
            .get(identity)
            .map(|entry| entry.callers.clone())
    }

    /// Snapshot of the entry for `identity`.
    pub fn entry(&self, identity: &str) -> Result<EntryInfo> {
        let state = self.inner.state.lock();
        let entry = state
            .entries
            .get(identity)
            .ok_or_else(|| Error::NotFound(identity.to_string()))?;

        Ok(EntryInfo {
            identity: identity.to_string(),
            ready: entry.session.is_some(),
            in_flight: state.flights.is_flying(identity),
            callers: entry.callers.clone(),
            idle: entry.idle_for(Instant::now()),
            touched_at: entry.touched_at,
        })
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            entries: state.entries.len(),
            ready: state
                .entries
                .values()
                .filter(|e| e.session.is_some())
                .count(),
            in_flight: state.flights.len(),
            callers: state.entries.values().map(|e| e.callers.len()).sum(),
        }
    }

    fn sweep_in_background(&self) {
        let cache = self.clone();
        tokio::spawn(async move {
            cache.sweep().await;
        });
    }
}

impl<F: SessionFactory> CacheInner<F> {
    /// Insert a fresh entry for `identity` and start establishing its session.
    ///
    /// Must be called with no flight registered for the identity.
    fn begin_establish(
        self: &Arc<Self>,
        state: &mut CacheState<F::Session>,
        identity: &str,
        credential: &str,
        caller: &str,
    ) -> Flight<Landed<F::Session>> {
        state
            .entries
            .insert(identity.to_string(), CacheEntry::new(caller.to_string()));

        let inner = Arc::clone(self);
        let key = identity.to_string();
        let credential = credential.to_string();
        let (flight, _) = state.flights.join_or_start(identity, move |ticket| {
            inner.establish(key, credential, ticket)
        });
        flight
    }

    async fn establish(
        self: Arc<Self>,
        identity: String,
        credential: String,
        ticket: Ticket,
    ) -> Result<Landed<F::Session>> {
        debug!(identity = %identity, "Establishing session");

        let outcome = AssertUnwindSafe(self.factory.establish(&credential, &identity))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FactoryError::transport("session factory panicked")));

        let orphan = {
            let mut state = self.state.lock();
            state.flights.finish(&identity, ticket);

            match outcome {
                Ok(session) => match state.entries.get_mut(&identity) {
                    // Merge into the existing entry so tokens added while
                    // establishing are kept.
                    Some(entry) => {
                        let session = Arc::new(session);
                        entry.session = Some(Arc::clone(&session));
                        entry.touch();
                        info!(identity = %identity, callers = entry.callers.len(), "Session established");
                        return Ok(Some(session));
                    }
                    None => session,
                },
                Err(e) => {
                    state.entries.remove(&identity);
                    let err = e.into_establish_error(self.factory.network());
                    warn!(identity = %identity, error = %err, "Session establishment failed");
                    return Err(err);
                }
            }
        };

        warn!(identity = %identity, "Entry vanished while establishing, closing session");
        if let Err(e) = orphan.close().await {
            warn!(identity = %identity, error = %e, "Failed to close orphaned session");
        }
        Err(Error::ShutDown)
    }

    /// Remove the entry for `identity` and start closing its session.
    ///
    /// Must be called with no flight registered for the identity. Returns the
    /// teardown flight, or `None` if there was nothing to close.
    fn begin_teardown(
        self: &Arc<Self>,
        state: &mut CacheState<F::Session>,
        identity: &str,
        reason: &'static str,
    ) -> Option<Flight<Landed<F::Session>>> {
        let entry = state.entries.remove(identity)?;
        let session = entry.session?;

        let inner = Arc::clone(self);
        let key = identity.to_string();
        let (flight, _) = state.flights.join_or_start(identity, move |ticket| {
            inner.close(key, session, ticket, reason)
        });
        Some(flight)
    }

    async fn close(
        self: Arc<Self>,
        identity: String,
        session: Arc<F::Session>,
        ticket: Ticket,
        reason: &'static str,
    ) -> Result<Landed<F::Session>> {
        debug!(identity = %identity, reason, "Closing session");

        let outcome = AssertUnwindSafe(session.close())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FactoryError::transport("session close panicked")));
        if let Err(e) = outcome {
            warn!(identity = %identity, error = %e, "Failed to close session, dropping it anyway");
        }

        self.state.lock().flights.finish(&identity, ticket);
        Ok(None)
    }
}

/// Snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Identity the entry is keyed by.
    pub identity: String,

    /// Whether a session is established.
    pub ready: bool,

    /// Whether an establishment or teardown is in flight.
    pub in_flight: bool,

    /// Registered caller tokens.
    pub callers: Vec<String>,

    /// Time since the entry was last touched.
    pub idle: Duration,

    /// Wall-clock time of the last touch.
    pub touched_at: DateTime<Utc>,
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries, including ones being established.
    pub entries: usize,

    /// Number of entries with an established session.
    pub ready: usize,

    /// Number of establishments and teardowns in flight.
    pub in_flight: usize,

    /// Total caller tokens across all entries.
    pub callers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::time::{advance, sleep};

    #[derive(Debug)]
    struct MockSession {
        identity: String,
        closes: Arc<AtomicUsize>,
        close_delay: Duration,
        fail_close: bool,
    }

    #[async_trait]
    impl Session for MockSession {
        fn identity(&self) -> &str {
            &self.identity
        }

        async fn close(&self) -> std::result::Result<(), FactoryError> {
            sleep(self.close_delay).await;
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(FactoryError::transport("context already gone"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MockFactory {
        establishes: AtomicUsize,
        closes: Arc<AtomicUsize>,
        delay: Duration,
        slow: HashMap<String, Duration>,
        close_delay: Duration,
        fail_close: bool,
        unregistered: HashSet<String>,
        failures: Mutex<Vec<FactoryError>>,
    }

    impl MockFactory {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn establishes(&self) -> usize {
            self.establishes.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionFactory for MockFactory {
        type Session = MockSession;

        fn network(&self) -> &str {
            "testnet"
        }

        async fn derive_identity(&self, credential: &str) -> std::result::Result<String, FactoryError> {
            if credential.is_empty() || credential.starts_with("bad") {
                return Err(FactoryError::MalformedCredential(
                    "expected a private key".into(),
                ));
            }
            Ok(format!("id:{credential}"))
        }

        async fn establish(
            &self,
            credential: &str,
            identity: &str,
        ) -> std::result::Result<MockSession, FactoryError> {
            self.establishes.fetch_add(1, Ordering::SeqCst);
            let delay = self.slow.get(credential).copied().unwrap_or(self.delay);
            sleep(delay).await;

            if self.unregistered.contains(credential) {
                return Err(FactoryError::NotRegistered(identity.to_string()));
            }
            if let Some(err) = self.failures.lock().pop() {
                return Err(err);
            }

            Ok(MockSession {
                identity: identity.to_string(),
                closes: Arc::clone(&self.closes),
                close_delay: self.close_delay,
                fail_close: self.fail_close,
            })
        }
    }

    fn quiet_config() -> CacheConfig {
        CacheConfig::new()
            .with_sweep_on_acquire(false)
            .with_sweep_task(false)
    }

    fn cache_with(factory: MockFactory) -> SessionCache<MockFactory> {
        SessionCache::new(factory, quiet_config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_share_one_establishment() {
        let cache = cache_with(MockFactory::with_delay(Duration::from_millis(50)));

        let results = join_all((0..5).map(|i| cache.acquire("cred1", format!("req-{i}")))).await;

        assert_eq!(cache.factory().establishes(), 1);
        let sessions: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        for session in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], session));
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.callers("id:cred1").unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_joined_while_establishing_are_kept() {
        let cache = cache_with(MockFactory::with_delay(Duration::from_millis(50)));

        let (a, b) = tokio::join!(
            cache.acquire("cred1", "req-1"),
            cache.acquire("cred1", "req-2")
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(
            cache.callers("id:cred1").unwrap(),
            vec!["req-1".to_string(), "req-2".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_session_is_reused() {
        let cache = cache_with(MockFactory::default());

        let first = cache.acquire("cred1", "req-1").await.unwrap();
        let second = cache.acquire("cred1", "req-2").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.identity(), "id:cred1");
        assert_eq!(cache.factory().establishes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_share_failure() {
        let factory = MockFactory::with_delay(Duration::from_millis(50));
        factory
            .failures
            .lock()
            .push(FactoryError::transport("connection refused"));
        let cache = cache_with(factory);

        let results = join_all((0..3).map(|i| cache.acquire("cred1", format!("req-{i}")))).await;

        assert_eq!(cache.factory().establishes(), 1);
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                Error::ConnectionFailed("connection refused".into())
            );
        }
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_poison_identity() {
        let factory = MockFactory::default();
        factory.failures.lock().push(FactoryError::transport("timeout"));
        let cache = cache_with(factory);

        assert!(cache.acquire("cred-a", "req-1").await.is_err());
        assert!(!cache.contains("id:cred-a"));

        let session = cache.acquire("cred-a", "req-2").await.unwrap();
        assert_eq!(session.identity(), "id:cred-a");
        assert_eq!(cache.factory().establishes(), 2);

        let other = cache.acquire("cred-b", "req-3").await.unwrap();
        assert_eq!(other.identity(), "id:cred-b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_identity_is_auth_error() {
        let mut factory = MockFactory::default();
        factory.unregistered.insert("stranger".into());
        let cache = cache_with(factory);

        let err = cache.acquire("stranger", "req-1").await.unwrap_err();
        assert_eq!(
            err,
            Error::AuthInvalid {
                network: "testnet".into()
            }
        );
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_derivation_failure_skips_establish() {
        let cache = cache_with(MockFactory::default());

        let err = cache.acquire("bad-key", "req-1").await.unwrap_err();
        assert!(matches!(err, Error::DerivationFailed(_)));
        assert_eq!(cache.factory().establishes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_identities_do_not_wait_on_each_other() {
        let mut factory = MockFactory::with_delay(Duration::from_millis(10));
        factory.slow.insert("slow".into(), Duration::from_secs(10));
        let cache = cache_with(factory);

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire("slow", "req-1").await })
        };
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(Duration::from_millis(100), cache.acquire("fast", "req-2"))
            .await
            .expect("fast identity waited on slow one");
        assert!(fast.is_ok());
        assert!(!slow.is_finished());

        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_entry_is_swept() {
        let cache = cache_with(MockFactory::default());

        cache.acquire("cred1", "req-1").await.unwrap();
        assert!(cache.detach("id:cred1", "req-1"));

        advance(Duration::from_secs(181)).await;
        assert_eq!(cache.sweep().await, 1);

        assert!(!cache.contains("id:cred1"));
        assert_eq!(cache.factory().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touched_entry_survives_sweep() {
        let cache = cache_with(MockFactory::default());

        cache.acquire("cred1", "req-1").await.unwrap();
        cache.detach("id:cred1", "req-1");

        advance(Duration::from_secs(100)).await;
        assert!(cache.touch("id:cred1"));
        advance(Duration::from_secs(100)).await;

        assert_eq!(cache.sweep().await, 0);
        assert!(cache.contains("id:cred1"));
        assert_eq!(cache.factory().closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_referenced_entry_survives_idle_sweep() {
        let cache = cache_with(MockFactory::default());

        cache.acquire("cred1", "req-1").await.unwrap();
        advance(Duration::from_secs(600)).await;

        assert_eq!(cache.sweep().await, 0);
        assert!(cache.contains("id:cred1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_only_policy_ignores_callers() {
        let config = quiet_config().with_eviction(EvictionPolicy::IdleOnly);
        let cache = SessionCache::new(MockFactory::default(), config);

        cache.acquire("cred1", "req-1").await.unwrap();
        advance(Duration::from_secs(181)).await;

        assert_eq!(cache.sweep().await, 1);
        assert!(cache.is_empty());
        assert_eq!(cache.factory().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_release_tears_down() {
        let cache = cache_with(MockFactory::default());

        for i in 0..3 {
            cache.acquire("cred1", format!("req-{i}")).await.unwrap();
        }
        cache.release("id:cred1", "req-0").await;
        cache.release("id:cred1", "req-1").await;
        assert!(cache.contains("id:cred1"));
        assert_eq!(cache.factory().closes(), 0);

        cache.release("id:cred1", "req-2").await;
        assert!(!cache.contains("id:cred1"));
        assert_eq!(cache.factory().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_entry_waits_for_idle_expiry() {
        let cache = cache_with(MockFactory::default());

        for i in 0..3 {
            cache.acquire("cred1", format!("req-{i}")).await.unwrap();
        }
        for i in 0..3 {
            cache.detach("id:cred1", &format!("req-{i}"));
        }
        assert_eq!(cache.callers("id:cred1").unwrap(), Vec::<String>::new());

        assert_eq!(cache.sweep().await, 0);
        advance(Duration::from_secs(181)).await;
        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.factory().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_removes_one_occurrence() {
        let cache = cache_with(MockFactory::default());

        cache.acquire("cred1", "dup").await.unwrap();
        cache.acquire("cred1", "dup").await.unwrap();
        cache.release("id:cred1", "dup").await;

        assert_eq!(cache.callers("id:cred1").unwrap(), vec!["dup".to_string()]);
        assert_eq!(cache.factory().closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_identity_is_noop() {
        let cache = cache_with(MockFactory::default());

        cache.release("id:nobody", "req-1").await;
        assert!(!cache.touch("id:nobody"));
        assert!(!cache.detach("id:nobody", "req-1"));
        assert!(matches!(cache.entry("id:nobody"), Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_during_teardown_gets_fresh_session() {
        let factory = MockFactory {
            close_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let cache = cache_with(factory);

        let old = cache.acquire("cred1", "req-1").await.unwrap();
        let releasing = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.release("id:cred1", "req-1").await })
        };
        tokio::task::yield_now().await;
        assert!(cache.entry("id:cred1").is_err());

        let fresh = cache.acquire("cred1", "req-2").await.unwrap();
        releasing.await.unwrap();

        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(cache.factory().closes(), 1);
        assert_eq!(cache.factory().establishes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_during_establishment_is_honored() {
        let cache = cache_with(MockFactory::with_delay(Duration::from_millis(50)));

        let acquiring = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire("cred1", "req-1").await })
        };
        tokio::task::yield_now().await;
        assert!(cache.entry("id:cred1").unwrap().in_flight);

        cache.release("id:cred1", "req-1").await;

        let session = acquiring.await.unwrap().unwrap();
        assert_eq!(session.identity(), "id:cred1");
        assert!(cache.is_empty());
        assert_eq!(cache.callers("id:cred1"), None);
        assert_eq!(cache.factory().establishes(), 1);
        assert_eq!(cache.factory().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_failure_still_removes_entry() {
        let factory = MockFactory {
            fail_close: true,
            ..Default::default()
        };
        let cache = cache_with(factory);

        cache.acquire("cred1", "req-1").await.unwrap();
        cache.release("id:cred1", "req-1").await;

        assert!(cache.is_empty());
        assert_eq!(cache.stats().in_flight, 0);
        assert_eq!(cache.factory().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_on_acquire_runs_in_background() {
        let config = quiet_config().with_sweep_on_acquire(true);
        let cache = SessionCache::new(MockFactory::default(), config);

        cache.acquire("cred-a", "req-1").await.unwrap();
        cache.detach("id:cred-a", "req-1");
        advance(Duration::from_secs(200)).await;

        cache.acquire("cred-b", "req-2").await.unwrap();
        cache.acquire("cred-b", "req-3").await.unwrap();
        sleep(Duration::from_millis(1)).await;

        assert!(!cache.contains("id:cred-a"));
        assert!(cache.contains("id:cred-b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweeper_evicts() {
        let config = CacheConfig::new()
            .with_sweep_on_acquire(false)
            .with_idle_timeout(Duration::from_secs(30))
            .with_sweep_interval(Duration::from_secs(10));
        let cache = SessionCache::new(MockFactory::default(), config);
        assert!(cache.spawn_sweeper());

        cache.acquire("cred1", "req-1").await.unwrap();
        cache.detach("id:cred1", "req-1");

        sleep(Duration::from_secs(45)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.factory().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_everything() {
        let cache = cache_with(MockFactory::default());

        cache.acquire("cred-a", "req-1").await.unwrap();
        cache.acquire("cred-b", "req-2").await.unwrap();
        cache.shutdown().await;

        assert!(cache.is_empty());
        assert_eq!(cache.factory().closes(), 2);
        assert_eq!(
            cache.acquire("cred-a", "req-3").await.unwrap_err(),
            Error::ShutDown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_entry_info() {
        let cache = cache_with(MockFactory::default());

        cache.acquire("cred-a", "req-1").await.unwrap();
        cache.acquire("cred-a", "req-2").await.unwrap();
        cache.acquire("cred-b", "req-3").await.unwrap();

        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 2,
                ready: 2,
                in_flight: 0,
                callers: 3,
            }
        );

        let info = cache.entry("id:cred-a").unwrap();
        assert!(info.ready);
        assert!(!info.in_flight);
        assert_eq!(info.callers, vec!["req-1", "req-2"]);
    }
}
