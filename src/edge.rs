//! Typed transport between two vertices.
//!
//! The default edge is a bounded in-memory queue. Pluggable edges (Kafka,
//! PubSub, SQS, HTTP, ...) are external collaborators: this crate defines
//! only the capability boundary they implement — implementers are not
//! subtypes of a base edge class, just providers of [`Edge::deliver`] and
//! [`Edge::bind`].

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::EdgeError;
use crate::payload::Payload;

/// A typed transport between a producer and a single downstream consumer.
///
/// An edge is bound to at most one consumer: `bind` is expected to fail
/// the second time it is called.
#[async_trait]
pub trait Edge<T: Payload>: Send + Sync {
    /// Enqueues one payload. Resolves once the payload is accepted, not
    /// necessarily once it has been processed.
    async fn deliver(&self, payload: T) -> Result<(), EdgeError>;

    /// Attaches the downstream consumer end of this edge. Must be called at
    /// most once; a second call should return [`EdgeError::AlreadyBound`].
    fn bind(&self) -> Result<EdgeReceiver<T>, EdgeError>;
}

/// The consumer side of a bound [`Edge`].
pub struct EdgeReceiver<T>(mpsc::Receiver<T>);

impl<T> EdgeReceiver<T> {
    /// Wraps a channel receiver for an `Edge` implementation's `bind`.
    ///
    /// Every `Edge` implementer, in or out of this crate, needs a way to
    /// return its bound consumer end; this is that constructor.
    pub fn new(receiver: mpsc::Receiver<T>) -> Self {
        Self(receiver)
    }

    /// Receives the next payload, or `None` once the producer side has
    /// closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.0.recv().await
    }
}

/// The default in-memory edge: a bounded `tokio::sync::mpsc` channel.
///
/// A `buffer_size` of `0` (the `Options` default, "rendezvous") is widened
/// to capacity `1`, since `tokio::sync::mpsc` requires at least one slot;
/// this still gives a producer-blocks-until-consumer-catches-up handoff.
pub struct MemoryEdge<T: Payload> {
    sender: mpsc::Sender<T>,
    receiver: Mutex<Option<mpsc::Receiver<T>>>,
}

impl<T: Payload> MemoryEdge<T> {
    /// Creates a new in-memory edge with the given channel capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { sender, receiver: Mutex::new(Some(receiver)) }
    }

    /// Returns a cloned sender, for wiring an additional producer into this
    /// edge (used internally to realize `While`'s back-edge).
    pub(crate) fn sender(&self) -> mpsc::Sender<T> {
        self.sender.clone()
    }
}

#[async_trait]
impl<T: Payload> Edge<T> for MemoryEdge<T> {
    async fn deliver(&self, payload: T) -> Result<(), EdgeError> {
        self.sender.send(payload).await.map_err(|_| EdgeError::Closed)
    }

    fn bind(&self) -> Result<EdgeReceiver<T>, EdgeError> {
        self.receiver.lock().take().map(EdgeReceiver::new).ok_or(EdgeError::AlreadyBound)
    }
}
