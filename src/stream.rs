//! `Stream::new`: the crate's single entry point, turning a source and an
//! `Options` bundle into a builder [`Cursor`] plus a handle that realizes
//! and launches the graph once building is complete.

use std::cell::RefCell;
use std::rc::Rc;

use tokio_util::sync::CancellationToken;

use crate::builder::{Cursor, GraphInner};
use crate::error::GraphError;
use crate::options::Options;
use crate::payload::Payload;
use crate::runtime::{self, Source};

/// The realized-but-not-yet-running graph, returned alongside its root
/// [`Cursor`] by [`new`].
///
/// Not `Send`/`Sync`: it still holds the `Rc<RefCell<_>>` graph description
/// that every `Cursor` clone shares, so it must be started from the same
/// thread the builder ran on (ordinary `tokio` current-thread or
/// multi-thread runtimes both satisfy this — only the vertex worker tasks
/// [`StartHandle::start`] spawns need to cross threads).
pub struct StartHandle<T: Payload> {
    graph: Rc<RefCell<GraphInner<T>>>,
    stream_id: String,
    options: Options<T>,
    source: Source<T>,
}

impl<T: Payload> StartHandle<T> {
    /// Realizes the graph — failing with [`GraphError::GraphIncomplete`] if
    /// any branch lacks a terminal, or [`GraphError::GraphMisuse`] if a
    /// `Cursor` clone somehow outlives the build — then spawns one `tokio`
    /// task per vertex. Returns immediately; the stream runs until `token`
    /// is cancelled.
    pub fn start(self, token: CancellationToken) -> Result<(), GraphError> {
        runtime::start_graph(self.graph, self.stream_id, self.options, self.source, token)
    }
}

/// Creates a new stream named `id`, fed by `source`, configured by
/// `options`, and returns `(start_handle, cursor)`: the cursor is the
/// as-yet-unterminated output of the implicit root vertex, ready for
/// [`Cursor`]'s operators.
pub fn new<T, S>(id: impl Into<String>, source: S, options: Options<T>) -> (StartHandle<T>, Cursor<T>)
where
    T: Payload,
    S: futures::Stream<Item = T> + Send + 'static,
{
    let stream_id = id.into();
    let graph = GraphInner::new(stream_id.clone());
    let cursor = Cursor::new(Rc::clone(&graph), "root".to_string(), 0, None);
    let handle = StartHandle {
        graph,
        stream_id,
        options,
        source: Box::pin(source),
    };
    (handle, cursor)
}
