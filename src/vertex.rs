//! Vertices: one graph node, its handler, and its not-yet-connected outputs.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::edge::Edge;
use crate::payload::Payload;
use crate::recurse::{Memoizer, Recurser};
use crate::transform::Bridge;

/// A vertex identifier, unique within one stream.
pub type VertexId = String;

pub(crate) type PureFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;
pub(crate) type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub(crate) type ForkFn<T> = Arc<dyn Fn(T) -> (T, T) + Send + Sync>;

/// The kind tag attached to a vertex, used for telemetry labelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexKind {
    /// The implicit first vertex of a stream, fed by the caller's source.
    Root,
    /// Sequential composition of one or more pure `T -> T` transforms.
    Then,
    /// The fixed point of a self-referential body.
    Recurse,
    /// A memoizing fixed point.
    Memoize,
    /// An `n`-way predicate dispatch.
    Select,
    /// A two-way predicate split.
    If,
    /// A duplicating split.
    Tee,
    /// The back-edge gate created by `While`.
    WhileGate,
    /// Reroutes a branch through a pluggable edge.
    Distribute,
    /// The synthetic vertex reading from a `Distribute` edge's bound end.
    DistributeSource,
    /// Discards every payload it receives.
    Drop,
    /// Forwards every payload into the caller-held output channel.
    Output,
    /// Bridges this branch into a differently-typed child stream.
    Transform,
}

impl VertexKind {
    /// A short, stable label suitable for metric and span names.
    pub fn as_str(&self) -> &'static str {
        match self {
            VertexKind::Root => "root",
            VertexKind::Then => "then",
            VertexKind::Recurse => "recurse",
            VertexKind::Memoize => "memoize",
            VertexKind::Select => "select",
            VertexKind::If => "if",
            VertexKind::Tee => "tee",
            VertexKind::WhileGate => "while_gate",
            VertexKind::Distribute => "distribute",
            VertexKind::DistributeSource => "distribute_source",
            VertexKind::Drop => "drop",
            VertexKind::Output => "output",
            VertexKind::Transform => "transform",
        }
    }
}

impl fmt::Display for VertexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The behavior attached to one vertex.
///
/// Arity (how many output slots the vertex owns) follows directly from the
/// variant: single-output operators get one, `If`/`Tee`/`WhileGate` get two,
/// `Select` gets one per predicate, and the two terminals (`Drop`, `Output`)
/// get none.
pub(crate) enum Handler<T: Payload> {
    Root,
    Then(PureFn<T>),
    Recurse(Recurser<T>),
    Memoize(Memoizer<T>),
    Select(Vec<Predicate<T>>),
    If(Predicate<T>),
    Tee(ForkFn<T>),
    WhileGate(Predicate<T>),
    Distribute(Arc<dyn Edge<T>>),
    DistributeSource,
    Drop,
    Output(mpsc::Sender<T>),
    /// Applies the erased bridge (map-and-send into the child stream's
    /// root) installed by `Cursor::transform`.
    Transform(Arc<dyn Bridge<T>>),
}

impl<T: Payload> Handler<T> {
    pub(crate) fn kind(&self) -> VertexKind {
        match self {
            Handler::Root => VertexKind::Root,
            Handler::Then(_) => VertexKind::Then,
            Handler::Recurse(_) => VertexKind::Recurse,
            Handler::Memoize(_) => VertexKind::Memoize,
            Handler::Select(_) => VertexKind::Select,
            Handler::If(_) => VertexKind::If,
            Handler::Tee(_) => VertexKind::Tee,
            Handler::WhileGate(_) => VertexKind::WhileGate,
            Handler::Distribute(_) => VertexKind::Distribute,
            Handler::DistributeSource => VertexKind::DistributeSource,
            Handler::Drop => VertexKind::Drop,
            Handler::Output(_) => VertexKind::Output,
            Handler::Transform(_) => VertexKind::Transform,
        }
    }

    /// Number of output slots this vertex owns.
    ///
    /// `Distribute` and `Transform` both end their branch within this
    /// graph's own vertex registry — their continuation (a `DistributeSource`
    /// vertex, or a vertex in a differently-typed child graph) is reached
    /// through a side channel, not through `outputs[]`.
    pub(crate) fn arity(&self) -> usize {
        match self {
            Handler::If(_) | Handler::Tee(_) | Handler::WhileGate(_) => 2,
            Handler::Select(preds) => preds.len(),
            Handler::Drop | Handler::Output(_) | Handler::Distribute(_) | Handler::Transform(_) => 0,
            _ => 1,
        }
    }
}

/// One node in the graph under construction: its handler plus the
/// downstream vertex (if any) wired into each of its output slots.
pub(crate) struct VertexSpec<T: Payload> {
    pub id: VertexId,
    pub handler: Handler<T>,
    /// `outputs[i]` names the vertex wired to output slot `i`, or `None` if
    /// that slot is not yet connected — the condition `Stream::start`
    /// rejects as `GraphIncomplete`.
    pub outputs: Vec<Option<VertexId>>,
}

impl<T: Payload> VertexSpec<T> {
    pub(crate) fn new(id: VertexId, handler: Handler<T>) -> Self {
        let arity = handler.arity();
        Self { id, handler, outputs: vec![None; arity] }
    }
}
