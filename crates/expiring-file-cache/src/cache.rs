//! Expiring on-disk cache in front of a remote object store
//!
//! Each cached key owns one file under the cache root and one reaper task.
//! The reaper sleeps until the entry's deadline; an access moves the deadline
//! forward under the state lock, so the reaper simply goes back to sleep when
//! it wakes up early. Downloads and expiry deletions for a key are serialised
//! through an in-flight slot: while one is running, other callers for the same
//! key wait for it instead of touching the file themselves.
//!
//! Downloads are written under `root/.partial/` and renamed into place. Keys
//! never start with a dot, so no key can name that directory or a file in it.

use crate::error::{CacheError, Result};
use crate::key::validate_key;
use crate::types::{CacheEntry, CacheStats, CleanupFailure};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use object_store_client::ObjectStore;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Directory under the cache root holding downloads in progress
const PARTIAL_DIR: &str = ".partial";

/// Idle timeout used when none is configured
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Observer for background deletions that failed
pub type CleanupHook = Arc<dyn Fn(&CleanupFailure) + Send + Sync>;

/// `None` while the operation runs, then the leader's result
type FlightOutcome = Option<Result<()>>;

struct Entry {
    size: u64,
    fetched_at: DateTime<Utc>,
    deadline: Instant,
    generation: u64,
    reaper: JoinHandle<()>,
}

/// What `ensure` does after inspecting the state
enum Next {
    Hit,
    Wait(watch::Receiver<FlightOutcome>),
    Lead(FlightGuard),
}

/// A download or deletion in progress for one key
struct Flight {
    id: u64,
    done: watch::Receiver<FlightOutcome>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    in_flight: HashMap<String, Flight>,
    closed: bool,
}

struct Inner {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    idle_timeout: Duration,
    fetch_timeout: Option<Duration>,
    cleanup_hook: CleanupHook,
    state: Mutex<State>,
    next_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    evictions: AtomicU64,
}

impl Inner {
    /// The lock is only ever held for map access, never across an await
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn partial_path(&self, key: &str, id: u64) -> PathBuf {
        self.root.join(PARTIAL_DIR).join(format!("{}-{}", key, id))
    }

    /// A failure caused by `clean` removing the root underneath a download
    /// is reported as [`CacheError::Closed`]
    fn closed_or(&self, err: CacheError) -> CacheError {
        if self.lock_state().closed {
            CacheError::Closed
        } else {
            err
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an in-flight slot for `key`. The caller must hold the state
    /// lock and have checked that no slot exists yet.
    fn begin_flight(self: &Arc<Self>, state: &mut State, key: &str) -> FlightGuard {
        let id = self.next_id();
        let (tx, rx) = watch::channel(None);
        state
            .in_flight
            .insert(key.to_string(), Flight { id, done: rx });
        FlightGuard {
            inner: Arc::clone(self),
            key: key.to_string(),
            id,
            tx,
        }
    }

    fn report_cleanup_failure(&self, key: &str, path: &Path, err: &std::io::Error) {
        let failure = CleanupFailure {
            key: key.to_string(),
            path: path.to_path_buf(),
            reason: err.to_string(),
        };
        (self.cleanup_hook)(&failure);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in state.entries.values() {
            entry.reaper.abort();
        }
    }
}

/// Owns an in-flight slot. Dropping it frees the slot; waiters that did not
/// receive an outcome retry from the start.
struct FlightGuard {
    inner: Arc<Inner>,
    key: String,
    id: u64,
    tx: watch::Sender<FlightOutcome>,
}

impl FlightGuard {
    fn finish(self, outcome: Result<()>) {
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if state.in_flight.get(&self.key).map(|f| f.id) == Some(self.id) {
            state.in_flight.remove(&self.key);
        }
    }
}

/// Configures an [`ExpiringFileCache`]
pub struct CacheBuilder {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    idle_timeout: Duration,
    fetch_timeout: Option<Duration>,
    cleanup_hook: Option<CleanupHook>,
}

impl CacheBuilder {
    /// How long an entry may go unaccessed before it is deleted
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Abort downloads that take longer than `timeout`. Unlimited by default.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Receive background deletion failures instead of only logging them
    pub fn cleanup_hook(mut self, hook: CleanupHook) -> Self {
        self.cleanup_hook = Some(hook);
        self
    }

    pub fn build(self) -> ExpiringFileCache {
        let cleanup_hook: CleanupHook = match self.cleanup_hook {
            Some(hook) => hook,
            None => Arc::new(|failure: &CleanupFailure| {
                warn!(
                    key = %failure.key,
                    path = ?failure.path,
                    error = %failure.reason,
                    "Failed to delete expired cache file"
                );
            }),
        };

        ExpiringFileCache {
            inner: Arc::new(Inner {
                root: self.root,
                store: self.store,
                idle_timeout: self.idle_timeout,
                fetch_timeout: self.fetch_timeout,
                cleanup_hook,
                state: Mutex::new(State::default()),
                next_id: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }
}

/// Local file cache for remote objects with sliding idle expiration.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct ExpiringFileCache {
    inner: Arc<Inner>,
}

impl ExpiringFileCache {
    /// Create a cache storing files directly under `root`
    pub fn new(root: PathBuf, store: Arc<dyn ObjectStore>, idle_timeout: Duration) -> Self {
        Self::builder(root, store).idle_timeout(idle_timeout).build()
    }

    pub fn builder(root: PathBuf, store: Arc<dyn ObjectStore>) -> CacheBuilder {
        CacheBuilder {
            root,
            store,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            fetch_timeout: None,
            cleanup_hook: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    /// Create the cache root, reusing it when it already exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.inner.root.join(PARTIAL_DIR))
            .await
            .map_err(|e| CacheError::Initialization {
                root: self.inner.root.clone(),
                reason: e.to_string(),
            })?;
        info!(
            cache_dir = ?self.inner.root,
            idle_timeout_secs = self.inner.idle_timeout.as_secs(),
            "Cache initialized"
        );
        Ok(())
    }

    /// Tear the cache down: stop every timer, forget every entry and remove
    /// the cache root with everything in it.
    ///
    /// The cache rejects further [`ensure`](Self::ensure) calls afterwards.
    /// Calling it again, or with the root already gone, is not an error.
    pub async fn clean(&self) -> Result<()> {
        let dropped = {
            let mut state = self.inner.lock_state();
            state.closed = true;
            state.in_flight.clear();
            let entries = std::mem::take(&mut state.entries);
            for entry in entries.values() {
                entry.reaper.abort();
            }
            entries.len()
        };

        match fs::remove_dir_all(&self.inner.root).await {
            Ok(()) => {
                info!(cache_dir = ?self.inner.root, entries = dropped, "Cache cleaned");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(cache_dir = ?self.inner.root, "Cache root already removed");
                Ok(())
            }
            Err(e) => Err(CacheError::Cleanup {
                root: self.inner.root.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Local path a key is (or would be) cached under
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.inner.path_for(key)
    }

    /// Whether `key` currently has a live entry. Does not touch its timer.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock_state().entries.contains_key(key)
    }

    /// Snapshot of the entry for `key`. Does not touch its timer.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let state = self.inner.lock_state();
        let entry = state.entries.get(key)?;
        let remaining = entry.deadline.saturating_duration_since(Instant::now());
        let remaining =
            chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());

        Some(CacheEntry {
            key: key.to_string(),
            path: self.inner.path_for(key),
            size: entry.size,
            fetched_at: entry.fetched_at,
            expires_at: Utc::now() + remaining,
        })
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock_state();
        CacheStats {
            entries: state.entries.len(),
            total_size: state.entries.values().map(|e| e.size).sum(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            fetches: self.inner.fetches.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }

    /// Return the local path of `key`, downloading the object first when it
    /// is not cached. Every call restarts the entry's idle timer.
    ///
    /// Concurrent calls for a key that is not cached share one download: the
    /// first caller fetches, the others wait for it and receive its result.
    pub async fn ensure(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;

        loop {
            let next = {
                let mut state = self.inner.lock_state();
                if state.closed {
                    return Err(CacheError::Closed);
                }

                if let Some(entry) = state.entries.get_mut(key) {
                    entry.deadline = Instant::now() + self.inner.idle_timeout;
                    Next::Hit
                } else if let Some(flight) = state.in_flight.get(key) {
                    Next::Wait(flight.done.clone())
                } else {
                    Next::Lead(self.inner.begin_flight(&mut state, key))
                }
            };

            let mut waiter = match next {
                Next::Hit => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "Cache hit");
                    return Ok(self.inner.path_for(key));
                }
                Next::Lead(flight) => {
                    self.inner.misses.fetch_add(1, Ordering::Relaxed);
                    return self.download(key, flight).await;
                }
                Next::Wait(waiter) => waiter,
            };

            debug!(key, "Waiting for in-flight operation");
            let outcome = match waiter.wait_for(Option::is_some).await {
                Ok(outcome) => (*outcome).clone(),
                // Abandoned without an outcome; start over
                Err(_) => None,
            };
            if let Some(Err(err)) = outcome {
                return Err(err);
            }
        }
    }

    async fn download(&self, key: &str, flight: FlightGuard) -> Result<PathBuf> {
        let path = self.inner.path_for(key);
        let partial = self.inner.partial_path(key, flight.id);

        self.inner.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Cache miss, fetching from object store");

        let fetched = match self.inner.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_into(key, &partial))
                .await
                .unwrap_or_else(|_| {
                    Err(CacheError::Fetch {
                        key: key.to_string(),
                        reason: format!("timed out after {:?}", limit),
                    })
                }),
            None => self.fetch_into(key, &partial).await,
        };

        let size = match fetched {
            Ok(size) => size,
            Err(err) => {
                remove_if_exists(&partial).await.ok();
                let err = self.inner.closed_or(err);
                warn!(key, error = %err, "Failed to fetch object into cache");
                flight.finish(Err(err.clone()));
                return Err(err);
            }
        };

        if let Err(e) = fs::rename(&partial, &path).await {
            remove_if_exists(&partial).await.ok();
            let err = self.inner.closed_or(CacheError::write(key, e));
            warn!(key, error = %err, "Failed to move object into place");
            flight.finish(Err(err.clone()));
            return Err(err);
        }

        let inserted = {
            let mut state = self.inner.lock_state();
            if state.closed {
                false
            } else {
                let generation = self.inner.next_id();
                let deadline = Instant::now() + self.inner.idle_timeout;
                let reaper = spawn_reaper(&self.inner, key.to_string(), generation, deadline);
                state.entries.insert(
                    key.to_string(),
                    Entry {
                        size,
                        fetched_at: Utc::now(),
                        deadline,
                        generation,
                        reaper,
                    },
                );
                true
            }
        };

        if !inserted {
            remove_if_exists(&path).await.ok();
            flight.finish(Err(CacheError::Closed));
            return Err(CacheError::Closed);
        }

        debug!(key, size, "Cached object");
        flight.finish(Ok(()));
        Ok(path)
    }

    /// Stream the remote object into `partial`, returning its size
    async fn fetch_into(&self, key: &str, partial: &Path) -> Result<u64> {
        let mut body = self
            .inner
            .store
            .get_object(key)
            .await
            .map_err(|e| CacheError::fetch(key, e))?;

        let mut file = fs::File::create(partial)
            .await
            .map_err(|e| CacheError::write(key, e))?;

        let mut size = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| CacheError::fetch(key, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CacheError::write(key, e))?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| CacheError::write(key, e))?;

        Ok(size)
    }
}

fn spawn_reaper(
    inner: &Arc<Inner>,
    key: String,
    generation: u64,
    deadline: Instant,
) -> JoinHandle<()> {
    let inner = Arc::downgrade(inner);
    tokio::spawn(reap(inner, key, generation, deadline))
}

/// Wait out an entry's idle timeout, then delete it.
///
/// Holds only a weak handle so a dropped cache does not outlive its tasks.
async fn reap(weak: Weak<Inner>, key: String, generation: u64, mut deadline: Instant) {
    loop {
        tokio::time::sleep_until(deadline).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };

        let flight = {
            let mut state = inner.lock_state();
            match state.entries.get(&key) {
                Some(entry) if entry.generation == generation => {
                    if entry.deadline > Instant::now() {
                        deadline = entry.deadline;
                        continue;
                    }
                }
                _ => return,
            }
            state.entries.remove(&key);
            // No flight can exist while the entry does
            inner.begin_flight(&mut state, &key)
        };

        inner.evictions.fetch_add(1, Ordering::Relaxed);
        let path = inner.path_for(&key);
        match remove_if_exists(&path).await {
            Ok(()) => debug!(key = %key, "Expired cache entry"),
            Err(e) => inner.report_cleanup_failure(&key, &path, &e),
        }

        // Waiters see no outcome and retry, which fetches the object again
        drop(flight);
        return;
    }
}

/// Remove a file, treating an already-missing file as success
async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
