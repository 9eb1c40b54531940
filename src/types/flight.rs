//! Single-flight memoizing cache with cycle detection.
//!
//! Every top-level resolution request runs under its own [`ChainId`]. Nested
//! lookups made while computing a value reuse the chain id, which lets the
//! cache tell a recursive request (same chain, key still pending) from a
//! concurrent one (other chain, key pending) and answer the former with
//! [`Flight::Cycle`] instead of waiting on itself.

use crate::utils::error::{GenError, Result};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CHAIN: AtomicU64 = AtomicU64::new(1);

/// Identity of one top-level resolution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(u64);

impl ChainId {
    pub fn next() -> Self {
        ChainId(NEXT_CHAIN.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub enum Flight<V> {
    Ready(V),
    /// The key is already being computed further up a chain that would
    /// end up waiting on the caller.
    Cycle,
}

type Outcome<V> = std::result::Result<V, Arc<GenError>>;

struct Pending<V> {
    owner: ChainId,
    outcome: Mutex<Option<Outcome<V>>>,
    done: Condvar,
}

impl<V: Clone> Pending<V> {
    fn new(owner: ChainId) -> Self {
        Self {
            owner,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn publish(&self, outcome: Outcome<V>) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome<V> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut outcome);
        }
    }
}

struct State<K, V> {
    pending: HashMap<K, Arc<Pending<V>>>,
    /// Key each blocked chain is waiting for.
    waits: HashMap<ChainId, K>,
}

impl<K: Eq + Hash, V> State<K, V> {
    /// True when `waiter` blocking on a key owned by `owner` would close a
    /// wait-for loop back to `waiter`.
    fn closes_cycle(&self, waiter: ChainId, owner: ChainId) -> bool {
        let mut current = owner;
        for _ in 0..=self.waits.len() {
            if current == waiter {
                return true;
            }
            let Some(next) = self
                .waits
                .get(&current)
                .and_then(|key| self.pending.get(key))
            else {
                return false;
            };
            current = next.owner;
        }
        false
    }
}

/// `get_or_compute` cache: at most one computation per key is in flight,
/// completed values are kept for the lifetime of the cache and failures are
/// handed to every waiter but never stored.
pub struct FlightCache<K, V> {
    ready: DashMap<K, V>,
    state: Mutex<State<K, V>>,
}

impl<K, V> Default for FlightCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FlightCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            ready: DashMap::new(),
            state: Mutex::new(State {
                pending: HashMap::new(),
                waits: HashMap::new(),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.ready.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    pub fn get_or_compute<F>(&self, key: &K, chain: ChainId, compute: F) -> Result<Flight<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(key) {
            return Ok(Flight::Ready(value));
        }

        let mut state = self.state.lock();
        if let Some(value) = self.get(key) {
            return Ok(Flight::Ready(value));
        }

        if let Some(pending) = state.pending.get(key).cloned() {
            if pending.owner == chain || state.closes_cycle(chain, pending.owner) {
                tracing::debug!("Cycle on {:?}, answering with a reference", key);
                return Ok(Flight::Cycle);
            }
            state.waits.insert(chain, key.clone());
            drop(state);

            let outcome = pending.wait();
            self.state.lock().waits.remove(&chain);
            return outcome.map(Flight::Ready).map_err(GenError::Shared);
        }

        let pending = Arc::new(Pending::new(chain));
        state.pending.insert(key.clone(), pending.clone());
        drop(state);

        let mut flight = InFlight {
            cache: self,
            key,
            pending,
            finished: false,
        };
        let outcome = compute();
        flight.finish(outcome)
    }

    fn settle(&self, key: &K, pending: &Pending<V>, outcome: Outcome<V>) {
        let mut state = self.state.lock();
        if let Ok(value) = &outcome {
            self.ready.insert(key.clone(), value.clone());
        }
        state.pending.remove(key);
        drop(state);
        pending.publish(outcome);
    }
}

/// Owner side of a pending computation. Publishes a failure if the
/// computation unwinds so waiters never block forever.
struct InFlight<'a, K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    cache: &'a FlightCache<K, V>,
    key: &'a K,
    pending: Arc<Pending<V>>,
    finished: bool,
}

impl<K, V> InFlight<'_, K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn finish(&mut self, outcome: Result<V>) -> Result<Flight<V>> {
        self.finished = true;
        match outcome {
            Ok(value) => {
                self.cache.settle(self.key, &self.pending, Ok(value.clone()));
                Ok(Flight::Ready(value))
            }
            Err(err) => {
                let shared = Arc::new(err);
                self.cache.settle(self.key, &self.pending, Err(shared.clone()));
                Err(GenError::Shared(shared))
            }
        }
    }
}

impl<K, V> Drop for InFlight<'_, K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.finished {
            let err = GenError::resolve(format!("resolution of {:?} was interrupted", self.key));
            self.cache.settle(self.key, &self.pending, Err(Arc::new(err)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_concurrent_requests_compute_once() {
        let cache: Arc<FlightCache<String, Arc<String>>> = Arc::new(FlightCache::new());
        let computed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let computed = computed.clone();
                thread::spawn(move || {
                    let key = "example.com/app.User".to_string();
                    match cache
                        .get_or_compute(&key, ChainId::next(), || {
                            computed.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(Arc::new("User".to_string()))
                        })
                        .unwrap()
                    {
                        Flight::Ready(value) => value,
                        Flight::Cycle => panic!("independent chains must not see a cycle"),
                    }
                })
            })
            .collect();

        let values: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(computed.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_recursive_request_on_same_chain_is_a_cycle() {
        let cache: FlightCache<&str, u32> = FlightCache::new();
        let chain = ChainId::next();

        let outer = cache
            .get_or_compute(&"node", chain, || {
                let inner = cache.get_or_compute(&"node", chain, || Ok(0))?;
                assert!(matches!(inner, Flight::Cycle));
                Ok(7)
            })
            .unwrap();
        assert!(matches!(outer, Flight::Ready(7)));
        assert_eq!(cache.get(&"node"), Some(7));
    }

    #[test]
    fn test_crossed_chains_do_not_deadlock() {
        let cache: Arc<FlightCache<&'static str, u32>> = Arc::new(FlightCache::new());
        let barrier = Arc::new(Barrier::new(2));
        let cycles = Arc::new(AtomicUsize::new(0));

        let spawn = |own: &'static str, other: &'static str| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            let cycles = cycles.clone();
            thread::spawn(move || {
                let chain = ChainId::next();
                cache
                    .get_or_compute(&own, chain, || {
                        barrier.wait();
                        match cache.get_or_compute(&other, chain, || Ok(1))? {
                            Flight::Cycle => {
                                cycles.fetch_add(1, Ordering::SeqCst);
                            }
                            Flight::Ready(_) => {}
                        }
                        Ok(2)
                    })
                    .unwrap();
            })
        };

        let a = spawn("a", "b");
        let b = spawn("b", "a");
        a.join().unwrap();
        b.join().unwrap();

        assert_eq!(cycles.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_failures_are_not_memoized() {
        let cache: FlightCache<&str, u32> = FlightCache::new();
        let err = cache
            .get_or_compute(&"broken", ChainId::next(), || {
                Err(GenError::resolve("missing"))
            })
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(cache.get(&"broken").is_none());

        let retry = cache
            .get_or_compute(&"broken", ChainId::next(), || Ok(3))
            .unwrap();
        assert!(matches!(retry, Flight::Ready(3)));
    }

    #[test]
    fn test_panicking_owner_releases_waiters() {
        let cache: Arc<FlightCache<&'static str, u32>> = Arc::new(FlightCache::new());
        let started = Arc::new(Barrier::new(2));

        let owner = {
            let cache = cache.clone();
            let started = started.clone();
            thread::spawn(move || {
                let _ = cache.get_or_compute(&"boom", ChainId::next(), || {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    panic!("parser crashed");
                });
            })
        };

        started.wait();
        let result = cache.get_or_compute(&"boom", ChainId::next(), || Ok(1));
        assert!(owner.join().is_err());
        match result {
            Err(err) => assert!(err.to_string().contains("interrupted")),
            Ok(Flight::Ready(value)) => assert_eq!(value, 1),
            Ok(Flight::Cycle) => panic!("unexpected cycle"),
        }
    }
}
