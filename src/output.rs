//! The terminal channel returned by [`crate::builder::Cursor::output`].

use tokio::sync::mpsc;

/// The reader end of an `Output` terminal.
///
/// The `Output` vertex's sender is owned by its own worker task, so this
/// channel closes (`recv` resolves to `None`) whenever that task exits —
/// whether because the upstream source ran dry or because the stream's
/// cancellation token fired. A caller that wants to distinguish "the
/// pipeline finished" from "the pipeline was cancelled while still
/// producing" should race [`Output::recv`] against its own clone of the
/// cancellation token rather than relying on channel closure alone.
pub struct Output<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Output<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Receives the next payload, or `None` once every producer of this
    /// channel has dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Takes whatever is immediately available without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}
