//! Per-stream configuration.
//!
//! Mirrors the teacher's small, explicit `worker::Config`/`execute::Config`
//! structs rather than pulling in a general configuration-loading crate —
//! the latter belongs to the out-of-core plugin/service layer, not here.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::payload::Payload;

/// A deep-copy function applied by `Tee` to produce an independent second
/// value. When unset, `Tee`'s two outputs share the original value.
pub type DeepCopyFn<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// Details of a single caught panic, passed to the configured
/// [`PanicHandler`].
pub struct PanicInfo<T> {
    /// The id of the stream the panicking vertex belongs to.
    pub stream_id: String,
    /// The id of the vertex whose handler panicked.
    pub vertex_id: String,
    /// The panic payload caught by `catch_unwind`.
    pub error: Box<dyn Any + Send>,
    /// The payload that was being processed when the handler panicked.
    pub payload: T,
}

/// Invoked once per caught panic, never for any other reason.
pub type PanicHandler<T> = Arc<dyn Fn(PanicInfo<T>) + Send + Sync>;

/// Invoked by the flush timer with `(vertex_id, evicted_value)` for each
/// entry evicted from a `Memoize` cache. Must not block.
pub type FlushSink<T> = Arc<dyn Fn(&str, T) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct FlushConfig<T> {
    pub period: Duration,
    pub sink: FlushSink<T>,
}

/// Per-stream configuration, immutable once `Stream::start` is called.
pub struct Options<T: Payload> {
    pub(crate) fifo: bool,
    pub(crate) buffer_size: usize,
    pub(crate) deep_copy: Option<DeepCopyFn<T>>,
    pub(crate) panic_handler: Option<PanicHandler<T>>,
    pub(crate) flush: Option<FlushConfig<T>>,
    pub(crate) attributes: Vec<(String, String)>,
}

impl<T: Payload> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            fifo: self.fifo,
            buffer_size: self.buffer_size,
            deep_copy: self.deep_copy.clone(),
            panic_handler: self.panic_handler.clone(),
            flush: self.flush.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

impl<T: Payload> Default for Options<T> {
    fn default() -> Self {
        Self {
            fifo: false,
            buffer_size: 0,
            deep_copy: None,
            panic_handler: None,
            flush: None,
            attributes: Vec::new(),
        }
    }
}

impl<T: Payload> Options<T> {
    /// Starts a fresh [`OptionsBuilder`].
    pub fn builder() -> OptionsBuilder<T> {
        OptionsBuilder::default()
    }

    /// Per-vertex serial processing (default off).
    pub fn fifo(&self) -> bool {
        self.fifo
    }

    /// Capacity of each edge channel (default 0, rendezvous).
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Labels attached to every span and event emitted by the stream.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// The deep-copy function `Tee` applies to its second output, if any.
    pub(crate) fn deep_copy(&self) -> Option<&DeepCopyFn<T>> {
        self.deep_copy.as_ref()
    }
}

/// Fluent builder for [`Options`].
pub struct OptionsBuilder<T: Payload> {
    inner: Options<T>,
}

impl<T: Payload> Default for OptionsBuilder<T> {
    fn default() -> Self {
        Self { inner: Options::default() }
    }
}

impl<T: Payload> OptionsBuilder<T> {
    /// Sets `FIFO` mode: each vertex processes one batch inline before
    /// reading the next, preserving arrival order within that vertex.
    pub fn fifo(mut self, fifo: bool) -> Self {
        self.inner.fifo = fifo;
        self
    }

    /// Sets the capacity of each edge channel. `0` requests a rendezvous
    /// handoff (implemented as capacity 1, since the underlying channel
    /// primitive requires at least one slot).
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.inner.buffer_size = buffer_size;
        self
    }

    /// Sets the deep-copy function used by `Tee` and other duplicating
    /// operators.
    pub fn deep_copy(mut self, f: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        self.inner.deep_copy = Some(Arc::new(f));
        self
    }

    /// Sets the handler invoked on every caught panic.
    pub fn panic_handler(mut self, h: impl Fn(PanicInfo<T>) + Send + Sync + 'static) -> Self {
        self.inner.panic_handler = Some(Arc::new(h));
        self
    }

    /// Installs a periodic cache-eviction hook; `sink` is called with
    /// `(vertex_id, evicted_value)` for each evicted `Memoize` entry.
    pub fn flush(
        mut self,
        period: Duration,
        sink: impl Fn(&str, T) + Send + Sync + 'static,
    ) -> Self {
        self.inner.flush = Some(FlushConfig { period, sink: Arc::new(sink) });
        self
    }

    /// Appends labels attached to every metric/span emitted by the stream.
    pub fn attributes<I, K, V>(mut self, kv: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inner.attributes.extend(kv.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Builds the immutable [`Options`] value.
    pub fn build(self) -> Options<T> {
        self.inner
    }
}
