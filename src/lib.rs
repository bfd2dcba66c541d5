//! `sluice` is the core of a typed, in-process dataflow engine: a builder
//! that turns a description of payload transforms into a connected graph of
//! vertices joined by edges, a scheduler that dispatches payloads along
//! that graph under a configurable concurrency discipline, structural
//! validation before the graph runs, and fault containment once it does.
//!
//! Network/queue adapters, a YAML/JSON graph loader, a service wrapper, and
//! a distributed replay log are explicitly out of scope here — they are
//! external collaborators that consume the [`Edge`] trait and the
//! [`Cursor`] builder surface without this crate depending on any of them.
//!
//! # Example
//!
//! ```no_run
//! use std::borrow::Cow;
//! use tokio::sync::mpsc;
//! use tokio_stream::wrappers::ReceiverStream;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Clone)]
//! struct Item { id: String, n: u64 }
//!
//! impl sluice::Identify for Item {
//!     fn id(&self) -> Cow<'_, str> { Cow::Borrowed(&self.id) }
//! }
//!
//! # async fn run() {
//! let (tx, rx) = mpsc::channel(8);
//! let (handle, cursor) = sluice::new("demo", ReceiverStream::new(rx), sluice::Options::builder().build());
//! let mut output = cursor.then(|mut item: Item| { item.n += 10; item }).output(8).unwrap();
//!
//! let token = CancellationToken::new();
//! handle.start(token).unwrap();
//!
//! tx.send(Item { id: "a".into(), n: 1 }).await.unwrap();
//! let got = output.recv().await.unwrap();
//! assert_eq!(got.n, 11);
//! # }
//! ```

#![warn(missing_docs)]

mod builder;
mod edge;
mod error;
mod options;
mod output;
mod payload;
mod recurse;
mod runtime;
mod stream;
mod telemetry;
mod transform;
mod vertex;

pub use builder::Cursor;
pub use edge::{Edge, EdgeReceiver, MemoryEdge};
pub use error::{EdgeError, GraphError};
pub use options::{Options, OptionsBuilder, PanicInfo};
pub use output::Output;
pub use payload::{Identify, Payload};
pub use recurse::{memoize, recurse, Memoizer, Recurser};
pub use stream::{new, StartHandle};
pub use vertex::{VertexId, VertexKind};

/// The cooperative-cancellation token a [`StartHandle::start`] call is
/// parameterized by; cancelling it stops every vertex worker loop at its
/// next read.
pub use tokio_util::sync::CancellationToken;
