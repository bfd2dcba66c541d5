//! The compile-time-only façade returned to user code.
//!
//! A [`Cursor`] is a cheap handle into a shared, not-yet-realized graph
//! description (the role the teacher's `OperatorBuilder` plays during
//! dataflow construction). Calling an operator appends a vertex and returns
//! one or more fresh cursors; a terminal call closes a branch.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::edge::Edge;
use crate::error::GraphError;
use crate::options::Options;
use crate::output::Output;
use crate::payload::Payload;
use crate::recurse::{Memoizer, Recurser};
use crate::transform::TypedBridge;
use crate::vertex::{Handler, Predicate, PureFn, VertexId, VertexKind, VertexSpec};

/// A child stream spliced on via `Transform`, started together with its
/// parent and sharing the parent's cancellation token.
///
/// Not `Send`: it closes over the child's `Rc<RefCell<GraphInner<U>>>`,
/// which is realized on the same thread that calls `Stream::start` (the
/// builder itself is single-threaded, like `Cursor`). Only the `tokio`
/// tasks `start_graph` spawns from it need to be `Send`.
pub(crate) type ChildStarter = Box<dyn FnOnce(CancellationToken) -> Result<(), GraphError>>;

/// The graph under construction for one payload type.
pub(crate) struct GraphInner<T: Payload> {
    pub stream_id: String,
    pub vertices: std::collections::HashMap<VertexId, VertexSpec<T>>,
    /// Every independent starting point of this graph: the literal `"root"`
    /// plus one per `Distribute` call.
    pub roots: Vec<VertexId>,
    /// For each non-`"root"` entry in `roots`, the edge its `DistributeSource`
    /// vertex binds to at realization time.
    pub distribute_edges: std::collections::HashMap<VertexId, Arc<dyn Edge<T>>>,
    pub children: Vec<ChildStarter>,
    seq: usize,
}

impl<T: Payload> GraphInner<T> {
    pub(crate) fn new(stream_id: String) -> Rc<RefCell<Self>> {
        let mut inner = Self {
            stream_id,
            vertices: std::collections::HashMap::new(),
            roots: vec!["root".to_string()],
            distribute_edges: std::collections::HashMap::new(),
            children: Vec::new(),
            seq: 0,
        };
        inner.vertices.insert("root".to_string(), VertexSpec::new("root".to_string(), Handler::Root));
        Rc::new(RefCell::new(inner))
    }

    fn gen_id(&mut self, kind: VertexKind) -> VertexId {
        self.seq += 1;
        format!("{}-{}", kind.as_str(), self.seq)
    }

    fn insert(&mut self, id: VertexId, handler: Handler<T>) -> Result<VertexId, GraphError> {
        if self.vertices.contains_key(&id) {
            return Err(GraphError::GraphMisuse {
                stream: self.stream_id.clone(),
                reason: format!("duplicate vertex id `{id}`"),
            });
        }
        self.vertices.insert(id.clone(), VertexSpec::new(id.clone(), handler));
        Ok(id)
    }

    fn connect(&mut self, from: &VertexId, slot: usize, to: VertexId) {
        let vertex = self.vertices.get_mut(from).expect("cursor referenced an unknown vertex");
        vertex.outputs[slot] = Some(to);
    }
}

/// Pending output position of the graph being built.
///
/// Every operator consumes `self` and returns the cursor(s) for its
/// output(s), so the ordinary misuse of calling an operator twice on one
/// output is a compile-time move error. What remains checked at
/// [`crate::stream::Stream::start`] is structural: every slot must end up
/// connected (or the graph is `GraphIncomplete`), and vertex ids must stay
/// unique (or the graph is `GraphMisuse`).
#[must_use = "a cursor represents an unterminated branch; connect it with an operator or a terminal (`output`, `discard`, `distribute`)"]
pub struct Cursor<T: Payload> {
    pub(crate) graph: Rc<RefCell<GraphInner<T>>>,
    pub(crate) vertex: VertexId,
    pub(crate) slot: usize,
    /// `Some(gate_id)` while this branch descends from a `While`'s body
    /// output and has not yet closed with `loop_back`.
    pub(crate) loop_gate: Option<VertexId>,
}

impl<T: Payload> Cursor<T> {
    pub(crate) fn new(graph: Rc<RefCell<GraphInner<T>>>, vertex: VertexId, slot: usize, loop_gate: Option<VertexId>) -> Self {
        Self { graph, vertex, slot, loop_gate }
    }

    fn child(&self, vertex: VertexId, slot: usize) -> Self {
        Self { graph: Rc::clone(&self.graph), vertex, slot, loop_gate: self.loop_gate.clone() }
    }

    fn append(self, handler: Handler<T>) -> Cursor<T> {
        let kind = handler.kind();
        let mut graph = self.graph.borrow_mut();
        let id = graph.gen_id(kind);
        graph.insert(id.clone(), handler).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, id.clone());
        drop(graph);
        self.child(id, 0)
    }

    fn require_not_in_loop(&self, op: &str) -> Result<(), GraphError> {
        if self.loop_gate.is_some() {
            return Err(GraphError::GraphMisuse {
                stream: self.graph.borrow().stream_id.clone(),
                reason: format!("`{op}` cannot terminate a `while` body branch; use `loop_back` instead"),
            });
        }
        Ok(())
    }

    /// Sequential composition of one pure `T -> T` transform, as a single
    /// vertex.
    pub fn then(self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Cursor<T> {
        self.then_all(vec![Box::new(f)])
    }

    /// Sequential composition of several pure `T -> T` transforms, applied
    /// in argument order as a single vertex.
    pub fn then_all(self, fns: Vec<Box<dyn Fn(T) -> T + Send + Sync>>) -> Cursor<T> {
        let composed: PureFn<T> = Arc::new(move |mut value: T| {
            for f in &fns {
                value = f(value);
            }
            value
        });
        self.append(Handler::Then(composed))
    }

    /// Attaches a vertex whose handler is the fixed point of `body`.
    /// Termination is the caller's responsibility.
    pub fn recurse(self, body: Recurser<T>) -> Cursor<T> {
        self.append(Handler::Recurse(body))
    }

    /// Same fixed point as `recurse`, but each self-call is memoized.
    pub fn memoize(self, body: Memoizer<T>) -> Cursor<T> {
        self.append(Handler::Memoize(body))
    }

    /// Routes each payload to the first predicate returning true; a payload
    /// matching none is dropped. Returns one cursor per predicate, in
    /// argument order.
    pub fn select(self, predicates: Vec<Arc<dyn Fn(&T) -> bool + Send + Sync>>) -> Vec<Cursor<T>> {
        let n = predicates.len();
        let kind = VertexKind::Select;
        let mut graph = self.graph.borrow_mut();
        let id = graph.gen_id(kind);
        graph.insert(id.clone(), Handler::Select(predicates)).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, id.clone());
        drop(graph);
        (0..n).map(|i| self.child(id.clone(), i)).collect()
    }

    /// Two-way split: payloads satisfying `p` go left, others go right.
    pub fn if_(self, p: impl Fn(&T) -> bool + Send + Sync + 'static) -> (Cursor<T>, Cursor<T>) {
        let predicate: Predicate<T> = Arc::new(p);
        let mut graph = self.graph.borrow_mut();
        let id = graph.gen_id(VertexKind::If);
        graph.insert(id.clone(), Handler::If(predicate)).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, id.clone());
        drop(graph);
        (self.child(id.clone(), 0), self.child(id, 1))
    }

    /// `If(p1 \/ ... \/ pn)`: payloads matching any predicate go left.
    pub fn or(self, predicates: Vec<Arc<dyn Fn(&T) -> bool + Send + Sync>>) -> (Cursor<T>, Cursor<T>) {
        self.if_(move |value| predicates.iter().any(|p| p(value)))
    }

    /// `If(p1 /\ ... /\ pn)`: payloads matching every predicate go left.
    pub fn and(self, predicates: Vec<Arc<dyn Fn(&T) -> bool + Send + Sync>>) -> (Cursor<T>, Cursor<T>) {
        self.if_(move |value| predicates.iter().all(|p| p(value)))
    }

    /// Duplicating split: both outputs always receive. If the stream's
    /// `DeepCopy` is configured, the second output receives an independent
    /// copy; otherwise the two outputs share the value.
    pub fn tee(self, fork: impl Fn(T) -> (T, T) + Send + Sync + 'static) -> (Cursor<T>, Cursor<T>) {
        let fork: Arc<dyn Fn(T) -> (T, T) + Send + Sync> = Arc::new(fork);
        let mut graph = self.graph.borrow_mut();
        let id = graph.gen_id(VertexKind::Tee);
        graph.insert(id.clone(), Handler::Tee(fork)).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, id.clone());
        drop(graph);
        (self.child(id.clone(), 0), self.child(id, 1))
    }

    /// Returns `(body, exit)`: payloads satisfying `p` flow into `body`,
    /// which must close with [`Cursor::loop_back`]; payloads failing `p`
    /// flow to `exit`.
    pub fn while_loop(self, p: impl Fn(&T) -> bool + Send + Sync + 'static) -> (Cursor<T>, Cursor<T>) {
        let predicate: Predicate<T> = Arc::new(p);
        let mut graph = self.graph.borrow_mut();
        let gate_id = graph.gen_id(VertexKind::WhileGate);
        graph.insert(gate_id.clone(), Handler::WhileGate(predicate)).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, gate_id.clone());
        drop(graph);
        let body = Cursor { graph: Rc::clone(&self.graph), vertex: gate_id.clone(), slot: 0, loop_gate: Some(gate_id.clone()) };
        let exit = self.child(gate_id, 1);
        (body, exit)
    }

    /// Closes a `While` body branch by redelivering its tail into the gate's
    /// own input. Only valid on a cursor descending from that gate's body
    /// output; any other branch must close with a terminal instead.
    pub fn loop_back(self) -> Result<(), GraphError> {
        match &self.loop_gate {
            None => Err(GraphError::GraphMisuse {
                stream: self.graph.borrow().stream_id.clone(),
                reason: "`loop_back` called outside a `while` body branch".to_string(),
            }),
            Some(gate_id) => {
                let gate_id = gate_id.clone();
                self.graph.borrow_mut().connect(&self.vertex, self.slot, gate_id);
                Ok(())
            }
        }
    }

    /// Reroutes this branch's output through `edge`, returning a new cursor
    /// reading from the same edge's downstream end.
    pub fn distribute(self, edge: Arc<dyn Edge<T>>) -> Cursor<T> {
        let mut graph = self.graph.borrow_mut();
        let sink_id = graph.gen_id(VertexKind::Distribute);
        graph.insert(sink_id.clone(), Handler::Distribute(Arc::clone(&edge))).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, sink_id);

        let source_id = graph.gen_id(VertexKind::DistributeSource);
        graph.insert(source_id.clone(), Handler::DistributeSource).expect("freshly generated id cannot collide");
        graph.roots.push(source_id.clone());
        graph.distribute_edges.insert(source_id.clone(), edge);
        drop(graph);

        self.child(source_id, 0)
    }

    /// Terminal: discards every payload this branch receives.
    pub fn discard(self) -> Result<(), GraphError> {
        self.require_not_in_loop("discard")?;
        let mut graph = self.graph.borrow_mut();
        let id = graph.gen_id(VertexKind::Drop);
        graph.insert(id.clone(), Handler::Drop).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, id);
        Ok(())
    }

    /// Terminal: returns a channel the caller reads from.
    pub fn output(self, buffer_size: usize) -> Result<Output<T>, GraphError> {
        self.require_not_in_loop("output")?;
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let mut graph = self.graph.borrow_mut();
        let id = graph.gen_id(VertexKind::Output);
        graph.insert(id.clone(), Handler::Output(tx)).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, id);
        Ok(Output::new(rx))
    }

    /// Splices a fresh, independently-typed stream of `U` onto this
    /// branch's output. Consumes the parent branch: it is a terminal for
    /// `T` and an origin for `U` — the parent branch does not keep flowing
    /// once it feeds a `Transform`.
    ///
    /// The child stream inherits the parent's cancellation token but not
    /// its `Options` verbatim; `options` is the child's own configuration.
    pub fn transform<U, F>(self, g: F, options: Options<U>) -> Result<Cursor<U>, GraphError>
    where
        U: Payload,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.require_not_in_loop("transform")?;
        let buffer = options.buffer_size().max(1);
        let (tx, rx) = mpsc::channel::<U>(buffer);

        let child_graph = GraphInner::<U>::new(format!("{}/transform", self.graph.borrow().stream_id));
        let child_cursor = Cursor::new(Rc::clone(&child_graph), "root".to_string(), 0, None);

        let child_stream_id = child_graph.borrow().stream_id.clone();
        let source = tokio_stream::wrappers::ReceiverStream::new(rx);
        let starter: ChildStarter = Box::new(move |token: CancellationToken| {
            crate::runtime::start_graph(child_graph, child_stream_id, options, Box::pin(source), token)
        });
        self.graph.borrow_mut().children.push(starter);

        let bridge = TypedBridge { map: g, sender: tx, _marker: PhantomData };
        let mut graph = self.graph.borrow_mut();
        let id = graph.gen_id(VertexKind::Transform);
        graph.insert(id.clone(), Handler::Transform(Arc::new(bridge))).expect("freshly generated id cannot collide");
        graph.connect(&self.vertex, self.slot, id);
        drop(graph);

        Ok(child_cursor)
    }
}
