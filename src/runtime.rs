//! Realization and scheduling: turns a built [`crate::builder::GraphInner`]
//! into running `tokio` tasks, one per vertex.

use std::collections::HashMap;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::builder::GraphInner;
use crate::edge::EdgeReceiver;
use crate::error::GraphError;
use crate::options::Options;
use crate::payload::Payload;
use crate::recurse::Memoizer;
use crate::telemetry;
use crate::vertex::{Handler, VertexId, VertexSpec};

/// A boxed, type-erased stream of payloads: the caller-supplied source for
/// the root vertex, or the bridged source of a `Transform`-spliced child.
pub(crate) type Source<T> = Pin<Box<dyn futures::Stream<Item = T> + Send>>;

/// Where one vertex reads its payloads from.
enum Inbound<T> {
    /// A normal internal edge, fed by zero or more predecessor vertices.
    Channel(mpsc::Receiver<T>),
    /// The caller-supplied source feeding the root vertex.
    Source(Source<T>),
    /// The bound downstream end of a `Distribute` edge, feeding its
    /// `DistributeSource` continuation.
    External(EdgeReceiver<T>),
}

impl<T> Inbound<T> {
    async fn recv(&mut self) -> Option<T> {
        match self {
            Inbound::Channel(rx) => rx.recv().await,
            Inbound::Source(s) => s.next().await,
            Inbound::External(rx) => rx.recv().await,
        }
    }
}

/// Where a computed value goes next within one vertex's own graph.
enum Routing<T> {
    /// Matched no predicate, or was otherwise dropped (`Select` exhaustivity
    /// miss).
    None,
    /// A single output slot receives `T`.
    One(usize, T),
    /// Several output slots each receive a value (`Tee`).
    Many(Vec<(usize, T)>),
}

/// Validates that every vertex's output slots are connected. Must run
/// before the graph's `Rc` is unwrapped: an unterminated branch is exactly
/// a live `Cursor` clone holding that `Rc`, so this check and the
/// subsequent `Rc::try_unwrap` are two views of the same invariant.
fn validate<T: Payload>(graph: &GraphInner<T>, stream_id: &str) -> Result<(), GraphError> {
    for (id, spec) in &graph.vertices {
        if spec.outputs.iter().any(Option::is_none) {
            return Err(GraphError::GraphIncomplete {
                stream: stream_id.to_string(),
                vertex: id.clone(),
            });
        }
    }
    Ok(())
}

/// Realizes `graph` and launches every vertex's worker loop as its own
/// `tokio` task, then starts every child stream spliced on via `Transform`.
/// Returns once workers are spawned; they run until `token` cancels.
pub(crate) fn start_graph<T: Payload>(
    graph: Rc<std::cell::RefCell<GraphInner<T>>>,
    stream_id: String,
    options: Options<T>,
    source: Source<T>,
    token: CancellationToken,
) -> Result<(), GraphError> {
    {
        let inner = graph.borrow();
        validate(&inner, &stream_id)?;
    }

    let inner = Rc::try_unwrap(graph)
        .map_err(|_| GraphError::GraphMisuse {
            stream: stream_id.clone(),
            reason: "graph still has live cursors; every branch must be terminated before `start`".to_string(),
        })?
        .into_inner();

    let GraphInner { vertices, roots, mut distribute_edges, children, .. } = inner;

    let buffer = options.buffer_size().max(1);
    let mut senders: HashMap<VertexId, mpsc::Sender<T>> = HashMap::new();
    let mut receivers: HashMap<VertexId, mpsc::Receiver<T>> = HashMap::new();
    for id in vertices.keys() {
        if roots.contains(id) {
            continue;
        }
        let (tx, rx) = mpsc::channel(buffer);
        senders.insert(id.clone(), tx);
        receivers.insert(id.clone(), rx);
    }

    let memoizers: Vec<(VertexId, Memoizer<T>)> = vertices
        .iter()
        .filter_map(|(id, v)| match &v.handler {
            Handler::Memoize(m) => Some((id.clone(), m.clone())),
            _ => None,
        })
        .collect();

    let options = Arc::new(options);
    spawn_flush(&options, memoizers, token.clone());

    let mut source_opt = Some(source);
    for (id, spec) in vertices {
        let out_senders: Vec<mpsc::Sender<T>> = spec
            .outputs
            .iter()
            .map(|slot| {
                let target = slot.as_ref().expect("validated: every slot is connected");
                senders
                    .get(target)
                    .cloned()
                    .expect("every non-root vertex has an input channel")
            })
            .collect();

        let inbound = if id == "root" {
            Inbound::Source(source_opt.take().expect("the root vertex is realized exactly once"))
        } else if let Some(edge) = distribute_edges.remove(&id) {
            let rx = edge.bind().map_err(|e| GraphError::GraphMisuse {
                stream: stream_id.clone(),
                reason: format!("distribute edge for `{id}` could not be bound: {e}"),
            })?;
            Inbound::External(rx)
        } else {
            Inbound::Channel(
                receivers
                    .remove(&id)
                    .expect("every non-root vertex has an input channel"),
            )
        };

        tokio::spawn(run_vertex(
            id,
            stream_id.clone(),
            spec,
            out_senders,
            inbound,
            Arc::clone(&options),
            token.clone(),
        ));
    }

    for starter in children {
        starter(token.clone())?;
    }

    Ok(())
}

fn spawn_flush<T: Payload>(options: &Arc<Options<T>>, memoizers: Vec<(VertexId, Memoizer<T>)>, token: CancellationToken) {
    let Some(flush_cfg) = options.flush.clone() else {
        return;
    };
    if memoizers.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_cfg.period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    for (vertex_id, memo) in &memoizers {
                        memo.flush(vertex_id, &*flush_cfg.sink);
                    }
                }
            }
        }
    });
}

/// The long-lived consumer loop for one vertex: read, dispatch (inline if
/// `FIFO`, else in a spawned task), repeat until `token` cancels or the
/// inbound side closes.
async fn run_vertex<T: Payload>(
    vertex_id: VertexId,
    stream_id: String,
    spec: VertexSpec<T>,
    out_senders: Vec<mpsc::Sender<T>>,
    mut inbound: Inbound<T>,
    options: Arc<Options<T>>,
    token: CancellationToken,
) {
    let handler = Arc::new(spec.handler);
    let span = telemetry::vertex_span(&stream_id, &vertex_id, handler.kind(), options.attributes());

    loop {
        let payload = tokio::select! {
            _ = token.cancelled() => break,
            item = inbound.recv() => match item {
                Some(p) => p,
                None => break,
            },
        };

        telemetry::record_batch(&stream_id, &vertex_id);

        if options.fifo() {
            dispatch_one(&vertex_id, &stream_id, &span, &handler, payload, &out_senders, &options).await;
        } else {
            let vertex_id = vertex_id.clone();
            let stream_id = stream_id.clone();
            let span = span.clone();
            let handler = Arc::clone(&handler);
            let out_senders = out_senders.clone();
            let options = Arc::clone(&options);
            tokio::spawn(async move {
                dispatch_one(&vertex_id, &stream_id, &span, &handler, payload, &out_senders, &options).await;
            });
        }
    }
}

/// Applies `handler` to one payload, under the panic shield, and forwards
/// the result (if any) to the appropriate output sender(s). Never returns
/// an error: failures are reported exclusively through the panic handler
/// and telemetry.
async fn dispatch_one<T: Payload>(
    vertex_id: &str,
    stream_id: &str,
    parent_span: &tracing::Span,
    handler: &Handler<T>,
    payload: T,
    out_senders: &[mpsc::Sender<T>],
    options: &Options<T>,
) {
    let payload_id = payload.id().into_owned();
    let span = telemetry::invocation_span(parent_span, &payload_id);
    let _enter = span.enter();
    let started = std::time::Instant::now();

    match handler {
        Handler::Drop => {}
        Handler::Output(tx) => {
            let tx = tx.clone();
            drop(_enter);
            let _ = tx.send(payload).await;
        }
        Handler::Distribute(edge) => {
            let edge = Arc::clone(edge);
            drop(_enter);
            if let Err(err) = edge.deliver(payload).await {
                // The engine reports edge delivery failures but does not
                // interpret or retry them; that's left to the edge itself.
                tracing::warn!(stream = %stream_id, vertex = %vertex_id, error = %err, "distribute edge delivery failed");
            }
        }
        Handler::Transform(bridge) => {
            let payload_for_panic = payload.clone();
            match bridge.try_apply(payload) {
                Ok(fut) => {
                    drop(_enter);
                    fut.await;
                }
                Err(panic_err) => {
                    drop(_enter);
                    telemetry::record_panic(stream_id, vertex_id);
                    if let Some(h) = &options.panic_handler {
                        h(crate::options::PanicInfo {
                            stream_id: stream_id.to_string(),
                            vertex_id: vertex_id.to_string(),
                            error: panic_err,
                            payload: payload_for_panic,
                        });
                    }
                }
            }
        }
        _ => {
            let payload_for_panic = payload.clone();
            let deep_copy = options.deep_copy();
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| compute_routing(handler, payload, deep_copy)));
            match outcome {
                Ok(routing) => {
                    drop(_enter);
                    route(routing, out_senders).await;
                }
                Err(panic_err) => {
                    drop(_enter);
                    telemetry::record_panic(stream_id, vertex_id);
                    if let Some(h) = &options.panic_handler {
                        h(crate::options::PanicInfo {
                            stream_id: stream_id.to_string(),
                            vertex_id: vertex_id.to_string(),
                            error: panic_err,
                            payload: payload_for_panic,
                        });
                    }
                }
            }
        }
    }

    telemetry::record_duration(stream_id, vertex_id, started.elapsed());
}

/// The pure, synchronous part of every non-terminal vertex kind: evaluate
/// user predicates/functions and decide which output slot(s) get the
/// result. Kept separate from [`dispatch_one`] so the whole computation —
/// including `Recurse`/`Memoize`'s synchronous recursive calls — sits
/// inside one `catch_unwind`.
fn compute_routing<T: Payload>(handler: &Handler<T>, payload: T, deep_copy: Option<&crate::options::DeepCopyFn<T>>) -> Routing<T> {
    match handler {
        Handler::Root | Handler::DistributeSource => Routing::One(0, payload),
        Handler::Then(f) => Routing::One(0, f(payload)),
        Handler::Recurse(r) => Routing::One(0, r.call(payload)),
        Handler::Memoize(m) => Routing::One(0, m.call(payload)),
        Handler::Select(preds) => {
            for (i, p) in preds.iter().enumerate() {
                if p(&payload) {
                    return Routing::One(i, payload);
                }
            }
            Routing::None
        }
        Handler::If(p) | Handler::WhileGate(p) => {
            if p(&payload) {
                Routing::One(0, payload)
            } else {
                Routing::One(1, payload)
            }
        }
        Handler::Tee(fork) => {
            let (left, right) = fork(payload);
            let right = match deep_copy {
                Some(dc) => dc(&right),
                None => right,
            };
            Routing::Many(vec![(0, left), (1, right)])
        }
        Handler::Drop | Handler::Output(_) | Handler::Distribute(_) | Handler::Transform(_) => {
            unreachable!("terminal handlers are dispatched directly in `dispatch_one`")
        }
    }
}

async fn route<T: Payload>(routing: Routing<T>, out_senders: &[mpsc::Sender<T>]) {
    match routing {
        Routing::None => {}
        Routing::One(slot, payload) => {
            if let Some(tx) = out_senders.get(slot) {
                let _ = tx.send(payload).await;
            }
        }
        Routing::Many(items) => {
            for (slot, payload) in items {
                if let Some(tx) = out_senders.get(slot) {
                    let _ = tx.send(payload).await;
                }
            }
        }
    }
}
