use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use thiserror::Error;

use crate::time::Instant;

/// The result of a settled computation, kept until it goes stale.
#[derive(Clone, Debug)]
struct CachedValue<T> {
    value: T,
    /// `None` if `settled + ttl` is not representable, which never expires.
    expires_at: Option<Instant>,
}

impl<T> CachedValue<T> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// A computation ended without producing a result.
///
/// This happens if the computation panicked, or if the runtime it was spawned on shut down.
/// Callers of [`RequestCache::get_or_compute`] receive it converted into their error type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("computation was canceled before it produced a result")]
pub struct ComputationCanceled;

type Computation<T, E> = Shared<oneshot::Receiver<Result<T, E>>>;

/// A computation that has been started but not yet settled.
struct InFlight<T, E> {
    /// Identifies this registration.
    ///
    /// A settling computation only writes its result if the registration for its key
    /// still carries the same generation, so invalidated computations are discarded.
    generation: u64,
    computation: Computation<T, E>,
}

struct State<T, E> {
    entries: HashMap<String, CachedValue<T>>,
    in_flight: HashMap<String, InFlight<T, E>>,
    generation: u64,
}

impl<T, E> Default for State<T, E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            generation: 0,
        }
    }
}

impl<T, E> State<T, E> {
    fn is_current(&self, key: &str, generation: u64) -> bool {
        self.in_flight
            .get(key)
            .is_some_and(|in_flight| in_flight.generation == generation)
    }
}

/// Runs a closure when dropped, including while unwinding from a panic.
struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Self {
            f: Some(Box::new(f)),
        }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// An in-memory cache for keyed async computations.
///
/// The purpose of this cache is to do request coalescing, and to hold the results of
/// successful computations in memory for a caller-specified time-to-live:
///
/// - A fresh value for the key is returned right away, without running the computation.
/// - If a computation for the key is already running, the caller joins it and receives
///   the same result, or the same error.
/// - Otherwise the computation is spawned and registered for the key before the lock is
///   released, so at most one computation per key runs at any time.
///
/// Errors are passed through unchanged and are never cached. Stale values are only
/// replaced when their key is requested again; there is no background eviction.
///
/// The cache is a cheap handle and can be cloned to share it between tasks.
pub struct RequestCache<T, E> {
    state: Arc<Mutex<State<T, E>>>,
}

impl<T, E> Clone for RequestCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Default for RequestCache<T, E> {
    fn default() -> Self {
        Self {
            state: Default::default(),
        }
    }
}

impl<T, E> fmt::Debug for RequestCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("RequestCache")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

fn lock<T, E>(state: &Mutex<State<T, E>>) -> MutexGuard<'_, State<T, E>> {
    // The state is consistent after every individual map operation.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> RequestCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<ComputationCanceled> + 'static,
{
    /// Creates a new, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or compute the value for `key`.
    ///
    /// `compute` is invoked at most once, and only if there is neither a fresh value nor a
    /// running computation for `key`. A successful result is stored for `ttl`, counted from
    /// the moment the computation settles. A `ttl` of zero never produces a cache hit, but
    /// concurrent callers are still coalesced.
    ///
    /// The computation is spawned onto the current tokio runtime, so it runs to completion and
    /// updates the cache even if every caller stops waiting for it. A computation that panics
    /// is removed from the cache, and its callers receive [`ComputationCanceled`].
    ///
    /// `compute` is called while the cache is locked, so it must not access this cache
    /// before returning its future.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F, ttl: Duration) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let computation = {
            let mut state = lock(&self.state);

            if let Some(entry) = state.entries.get(key) {
                if entry.is_fresh(Instant::now()) {
                    tracing::trace!(key, "request cache hit");
                    return Ok(entry.value.clone());
                }
            }

            match state.in_flight.get(key) {
                Some(in_flight) => {
                    tracing::trace!(key, "joining in-flight computation");
                    in_flight.computation.clone()
                }
                None => {
                    tracing::trace!(key, "request cache miss");
                    state.generation += 1;
                    let generation = state.generation;
                    let computation = self.spawn_computation(key, generation, compute(), ttl);
                    state.in_flight.insert(
                        key.to_owned(),
                        InFlight {
                            generation,
                            computation: computation.clone(),
                        },
                    );
                    computation
                }
            }
        };

        computation
            .await
            .unwrap_or_else(|_canceled| Err(ComputationCanceled.into()))
    }

    /// Spawns `future` and returns a shareable channel for its result.
    ///
    /// When the future settles, its in-flight registration is removed and a successful result
    /// is stored. If the future panics, the registration is still removed. Nothing is touched
    /// if the registration was invalidated meanwhile.
    fn spawn_computation<Fut>(
        &self,
        key: &str,
        generation: u64,
        future: Fut,
        ttl: Duration,
    ) -> Computation<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let state: Weak<Mutex<State<T, E>>> = Arc::downgrade(&self.state);
        let key = key.to_owned();

        let remove_registration = {
            let state = state.clone();
            let key = key.clone();
            CallOnDrop::new(move || {
                let Some(state) = state.upgrade() else {
                    return;
                };
                let mut state = lock(&state);
                if state.is_current(&key, generation) {
                    state.in_flight.remove(&key);
                }
            })
        };

        let computation = async move {
            let result = future.await;

            if let Some(state) = state.upgrade() {
                let mut state = lock(&state);
                if !state.is_current(&key, generation) {
                    tracing::trace!(key = %key, "discarding result of invalidated computation");
                } else {
                    state.in_flight.remove(&key);
                    if let Ok(value) = &result {
                        let expires_at = Instant::now().checked_add(ttl);
                        state.entries.insert(
                            key,
                            CachedValue {
                                value: value.clone(),
                                expires_at,
                            },
                        );
                    } else {
                        tracing::trace!(key = %key, "computation failed, not caching");
                    }
                }
            }

            // The registration is gone by now, so callers either get this channel or start a
            // new computation.
            drop(remove_registration);
            sender.send(result).ok();
        };

        tokio::spawn(computation);

        receiver.shared()
    }

    /// Invalidates a single key, or the whole cache if `key` is `None`.
    ///
    /// This removes both stored values and in-flight registrations. A computation that is
    /// still running is not cancelled: its current callers still receive its result, but
    /// the result is not stored.
    pub fn invalidate(&self, key: Option<&str>) {
        let mut state = lock(&self.state);
        state.generation += 1;
        match key {
            Some(key) => {
                state.entries.remove(key);
                state.in_flight.remove(key);
            }
            None => {
                state.entries.clear();
                state.in_flight.clear();
            }
        }
    }

    /// The number of stored values, including stale ones.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// Returns `true` if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of computations currently registered as running.
    pub fn in_flight_len(&self) -> usize {
        lock(&self.state).in_flight.len()
    }
}
