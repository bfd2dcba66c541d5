//! Self-referential handler bodies for `Recurse` and `Memoize`.
//!
//! Rust closures cannot name themselves, so the fixed point is tied
//! explicitly: the body receives a [`Recurser`] handle and calls `.call(x)`
//! on it to recurse, instead of calling itself directly.

use std::sync::Arc;

use dashmap::DashMap;

use crate::payload::Payload;

/// A callable handle to a `Recurse`/`Memoize` body's own fixed point.
///
/// Cloning a `Recurser` is cheap (it shares the underlying body via `Arc`).
pub struct Recurser<T> {
    body: Arc<dyn Fn(&Recurser<T>, T) -> T + Send + Sync>,
}

impl<T> Clone for Recurser<T> {
    fn clone(&self) -> Self {
        Self { body: Arc::clone(&self.body) }
    }
}

impl<T> Recurser<T> {
    /// Invokes the body, passing it a handle to itself for further
    /// recursive calls.
    pub fn call(&self, input: T) -> T {
        (self.body)(self, input)
    }
}

/// Attaches a vertex whose handler is the fixed point of `body`: the
/// recursion is unrestricted, termination is the caller's responsibility.
pub fn recurse<T, F>(body: F) -> Recurser<T>
where
    F: Fn(&Recurser<T>, T) -> T + Send + Sync + 'static,
{
    Recurser { body: Arc::new(body) }
}

/// Same fixed point as [`Recurser`], but each self-call is memoized by a
/// textual key derived from the argument.
///
/// The cache is unbounded unless a flush is configured. Because
/// `FIFO = false` lets many top-level invocations run as concurrent tasks,
/// the cache is a [`DashMap`] rather than a plain `HashMap`: the engine
/// otherwise introduces no additional lock in the default path, but the
/// cache itself is shared state and needs its own synchronization once
/// invocations are no longer strictly serialized.
pub struct Memoizer<T: Payload> {
    body: Arc<dyn Fn(&Memoizer<T>, T) -> T + Send + Sync>,
    key: Arc<dyn Fn(&T) -> String + Send + Sync>,
    cache: Arc<DashMap<String, T>>,
}

impl<T: Payload> Clone for Memoizer<T> {
    fn clone(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
            key: Arc::clone(&self.key),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<T: Payload> Memoizer<T> {
    /// Invokes the body for `input` unless `key(input)` is already cached,
    /// in which case the cached value is returned without calling the
    /// body's base case again.
    pub fn call(&self, input: T) -> T {
        let key = (self.key)(&input);
        if let Some(hit) = self.cache.get(&key) {
            return hit.value().clone();
        }
        let result = (self.body)(self, input);
        self.cache.insert(key, result.clone());
        result
    }

    /// Evicts every cached entry, invoking `sink(vertex_id, value)` for
    /// each. Called by the stream's flush timer, never concurrently with
    /// itself.
    pub(crate) fn flush(&self, vertex_id: &str, sink: &dyn Fn(&str, T)) {
        let keys: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, value)) = self.cache.remove(&key) {
                sink(vertex_id, value);
            }
        }
    }
}

/// Attaches a memoizing vertex: same fixed-point semantics as [`recurse`],
/// with a per-vertex cache keyed by `key`.
pub fn memoize<T, F, K>(body: F, key: K) -> Memoizer<T>
where
    T: Payload,
    F: Fn(&Memoizer<T>, T) -> T + Send + Sync + 'static,
    K: Fn(&T) -> String + Send + Sync + 'static,
{
    Memoizer { body: Arc::new(body), key: Arc::new(key), cache: Arc::new(DashMap::new()) }
}
