//! End-to-end behavior checks: the terminator, FIFO, memoize, select,
//! tee, panic-isolation, cancellation, and flush invariants the engine is
//! expected to uphold.

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use sluice::{Edge, EdgeError, EdgeReceiver, Identify, MemoryEdge, Options};

#[derive(Clone, Debug, PartialEq)]
struct Item {
    id: String,
    n: i64,
}

impl Identify for Item {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.id)
    }
}

fn item(id: &str, n: i64) -> Item {
    Item { id: id.to_string(), n }
}

fn source(buffer: usize) -> (mpsc::Sender<Item>, ReceiverStream<Item>) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, ReceiverStream::new(rx))
}

/// A linear `Then` chain preserves values (and, with `FIFO`, order).
#[tokio::test]
async fn then_chain_adds_ten() {
    let (tx, rx) = source(8);
    let (handle, cursor) = sluice::new("s1", rx, Options::builder().fifo(true).build());
    let mut output = cursor.then(|mut v: Item| { v.n += 10; v }).output(8).unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    for (id, n) in [("a", 1), ("b", 2), ("c", 3)] {
        tx.send(item(id, n)).await.unwrap();
    }
    drop(tx);

    assert_eq!(output.recv().await.unwrap(), item("a", 11));
    assert_eq!(output.recv().await.unwrap(), item("b", 12));
    assert_eq!(output.recv().await.unwrap(), item("c", 13));
    assert!(output.recv().await.is_none());
    token.cancel();
}

/// With `FIFO = true`, a single branch of `Then` vertices preserves input
/// order for any input sequence.
#[tokio::test]
async fn fifo_invariant_preserves_order() {
    let (tx, rx) = source(64);
    let (handle, cursor) = sluice::new("fifo", rx, Options::builder().fifo(true).build());
    let mut output = cursor
        .then(|mut v: Item| { v.n *= 2; v })
        .then(|mut v: Item| { v.n += 1; v })
        .output(64)
        .unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    let sequence: Vec<i64> = (0..50).collect();
    for n in &sequence {
        tx.send(item("x", *n)).await.unwrap();
    }
    drop(tx);

    for n in &sequence {
        assert_eq!(output.recv().await.unwrap().n, n * 2 + 1);
    }
    token.cancel();
}

/// `Memoize` over a recursive Fibonacci body, spliced through `Transform`
/// into a differently-typed terminal stream.
#[tokio::test]
async fn memoized_fibonacci_across_transform() {
    #[derive(Clone, Debug)]
    struct Answer(u64);
    impl Identify for Answer {
        fn id(&self) -> Cow<'_, str> {
            Cow::Owned(self.0.to_string())
        }
    }

    #[derive(Clone, Debug)]
    struct Req {
        id: String,
        n: u64,
    }
    impl Identify for Req {
        fn id(&self) -> Cow<'_, str> {
            Cow::Borrowed(&self.id)
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_inner = Arc::clone(&calls);
    let fib = sluice::memoize::<Req, _, _>(
        move |me, req| {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            if req.n < 2 {
                req
            } else {
                let a = me.call(Req { id: req.id.clone(), n: req.n - 1 }).n;
                let b = me.call(Req { id: req.id.clone(), n: req.n - 2 }).n;
                Req { id: req.id, n: a + b }
            }
        },
        |req| req.n.to_string(),
    );

    let (tx, rx) = mpsc::channel(4);
    let (handle, cursor) = sluice::new("s2", ReceiverStream::new(rx), Options::builder().build());
    let mut output = cursor
        .memoize(fib)
        .transform(|req: Req| Answer(req.n), Options::builder().build())
        .unwrap()
        .output(4)
        .unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(Req { id: "k".to_string(), n: 5 }).await.unwrap();
    assert_eq!(output.recv().await.unwrap().0, 5);

    tx.send(Req { id: "k".to_string(), n: 11 }).await.unwrap();
    assert_eq!(output.recv().await.unwrap().0, 89);

    drop(tx);
    token.cancel();
}

/// A payload matching the i-th predicate in `Select` is emitted on output i
/// and no other.
#[tokio::test]
async fn select_routes_to_matching_index() {
    let (tx, rx) = source(8);
    let (handle, cursor) = sluice::new("s3", rx, Options::builder().build());
    type Pred = Arc<dyn Fn(&Item) -> bool + Send + Sync>;
    let branches = cursor.select(vec![
        Arc::new(|_: &Item| false) as Pred,
        Arc::new(|_: &Item| false) as Pred,
        Arc::new(|_: &Item| true) as Pred,
    ]);
    let mut branches = branches.into_iter();
    branches.next().unwrap().discard().unwrap();
    branches.next().unwrap().discard().unwrap();
    let mut output = branches.next().unwrap().output(8).unwrap();
    assert!(branches.next().is_none());

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    for (id, n) in [("p1", 1), ("p2", 2), ("p3", 3)] {
        tx.send(item(id, n)).await.unwrap();
    }
    drop(tx);

    assert_eq!(output.recv().await.unwrap().id, "p1");
    assert_eq!(output.recv().await.unwrap().id, "p2");
    assert_eq!(output.recv().await.unwrap().id, "p3");
    token.cancel();
}

/// A payload matching no predicate in `Select` is silently dropped.
#[tokio::test]
async fn select_no_match_is_dropped() {
    let (tx, rx) = source(8);
    let (handle, cursor) = sluice::new("select-miss", rx, Options::builder().build());
    let pred: Arc<dyn Fn(&Item) -> bool + Send + Sync> = Arc::new(|v: &Item| v.n > 100);
    let mut branches = cursor.select(vec![pred]).into_iter();
    let mut output = branches.next().unwrap().output(8).unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(item("low", 1)).await.unwrap();
    tx.send(item("high", 200)).await.unwrap();
    drop(tx);

    assert_eq!(output.recv().await.unwrap().id, "high");
    assert!(output.recv().await.is_none());
    token.cancel();
}

/// A panicking handler is isolated to its own vertex invocation; the panic
/// handler fires exactly once, nothing is forwarded downstream for that
/// payload, and the stream keeps flowing for subsequent payloads.
#[tokio::test]
async fn panic_isolation() {
    let (tx, rx) = source(8);
    let panics: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let panics_inner = Arc::clone(&panics);

    let (handle, cursor) = sluice::new(
        "s4",
        rx,
        Options::builder()
            .fifo(true)
            .panic_handler(move |info: sluice::PanicInfo<Item>| {
                panics_inner.lock().unwrap().push(info.payload.id.clone());
            })
            .build(),
    );
    let mut output = cursor
        .then(|v: Item| {
            if v.id == "x" {
                panic!("boom");
            }
            v
        })
        .output(8)
        .unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(item("x", 0)).await.unwrap();
    tx.send(item("y", 1)).await.unwrap();
    drop(tx);

    assert_eq!(output.recv().await.unwrap().id, "y");
    assert!(output.recv().await.is_none());
    assert_eq!(panics.lock().unwrap().as_slice(), ["x"]);
    token.cancel();
}

/// `Tee` duplication: both outputs receive a copy; with `DeepCopy` set the
/// two copies are independent.
#[tokio::test]
async fn tee_duplicates_independently() {
    let (tx, rx) = source(8);
    let (handle, cursor) = sluice::new(
        "s5",
        rx,
        Options::builder().deep_copy(|v: &Item| v.clone()).build(),
    );
    let (left, right) = cursor.tee(|v: Item| {
        let copy = v.clone();
        (v, copy)
    });
    let mut left = left.output(8).unwrap();
    let mut right = right.output(8).unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(item("a", 1)).await.unwrap();
    tx.send(item("b", 2)).await.unwrap();
    drop(tx);

    let mut l = left.recv().await.unwrap();
    let r = right.recv().await.unwrap();
    assert_eq!(l.id, "a");
    assert_eq!(r.id, "a");
    l.n = 999;
    assert_eq!(r.n, 1, "deep-copied side must not see mutation of the other");

    assert_eq!(left.recv().await.unwrap().id, "b");
    assert_eq!(right.recv().await.unwrap().id, "b");
    token.cancel();
}

/// Terminator invariant: a graph with a branch that was never connected to
/// a terminal fails `start` with `GraphIncomplete` rather than running.
#[tokio::test]
async fn terminator_invariant_rejects_unterminated_branch() {
    let (_tx, rx) = source(1);
    let (handle, cursor) = sluice::new("incomplete", rx, Options::<Item>::builder().build());
    let (left, right) = cursor.if_(|v: &Item| v.n > 0);
    left.discard().unwrap();
    // `right` is intentionally dropped without a terminal.
    drop(right);

    let token = CancellationToken::new();
    let err = handle.start(token).unwrap_err();
    assert!(matches!(err, sluice::GraphError::GraphIncomplete { .. }));
}

/// `While` loops its body back into the gate until the predicate fails,
/// then the item proceeds out the exit branch.
#[tokio::test]
async fn while_loops_until_predicate_fails() {
    let (tx, rx) = source(8);
    let (handle, cursor) = sluice::new("while", rx, Options::builder().fifo(true).build());
    let (body, exit) = cursor.while_loop(|v: &Item| v.n < 5);
    body.then(|mut v: Item| { v.n += 1; v }).loop_back().unwrap();
    let mut output = exit.output(8).unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(item("a", 0)).await.unwrap();
    drop(tx);

    assert_eq!(output.recv().await.unwrap().n, 5);
    token.cancel();
}

/// Flush policy: the periodic sink is invoked with every evicted
/// `Memoize` entry and the cache is empty afterward (verified indirectly
/// through the sink callback being called for a known key).
#[tokio::test]
async fn flush_evicts_memoize_cache() {
    let evicted: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let evicted_inner = Arc::clone(&evicted);

    #[derive(Clone, Debug)]
    struct N(i64);
    impl Identify for N {
        fn id(&self) -> Cow<'_, str> {
            Cow::Owned(self.0.to_string())
        }
    }

    let fib = sluice::memoize::<N, _, _>(
        |_me, n| n,
        |n| n.0.to_string(),
    );

    let (tx, rx) = mpsc::channel(4);
    let (handle, cursor) = sluice::new(
        "flush",
        ReceiverStream::new(rx),
        Options::builder()
            .flush(Duration::from_millis(20), move |_vertex: &str, n: N| {
                evicted_inner.lock().unwrap().push(n.0.to_string());
            })
            .build(),
    );
    let mut output = cursor.memoize(fib).output(4).unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(N(42)).await.unwrap();
    output.recv().await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    token.cancel();

    assert_eq!(evicted.lock().unwrap().as_slice(), ["42"]);
}

/// Cancellation cleanliness: after the token is cancelled, no further
/// payloads delivered to the source reach the output.
#[tokio::test]
async fn cancellation_stops_delivery() {
    let (tx, rx) = source(8);
    let (handle, cursor) = sluice::new("cancel", rx, Options::builder().fifo(true).build());
    let mut output = cursor.then(|v: Item| v).output(8).unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(item("a", 1)).await.unwrap();
    assert_eq!(output.recv().await.unwrap().id, "a");

    token.cancel();
    // give the worker loops a chance to observe cancellation
    tokio::time::sleep(Duration::from_millis(20)).await;

    // further sends may or may not be accepted by the now-idle channel, but
    // nothing should ever reach the output again.
    let _ = tx.try_send(item("b", 2));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(output.try_recv().is_none());
}

/// An edge whose `deliver` always fails, to exercise `ExternalEdgeFailure`
/// reporting without tying the test to the default `MemoryEdge`.
struct AlwaysFailEdge;

#[async_trait::async_trait]
impl Edge<Item> for AlwaysFailEdge {
    async fn deliver(&self, _payload: Item) -> Result<(), EdgeError> {
        Err(EdgeError::External("simulated transport outage".to_string()))
    }

    fn bind(&self) -> Result<EdgeReceiver<Item>, EdgeError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(EdgeReceiver::new(rx))
    }
}

/// `Distribute` reroutes a branch's output through a caller-supplied edge
/// and resumes the logical graph from that edge's bound downstream end.
#[tokio::test]
async fn distribute_routes_through_edge() {
    let (tx, rx) = source(8);
    let edge = Arc::new(MemoryEdge::<Item>::new(4));
    let (handle, cursor) = sluice::new("distribute", rx, Options::builder().build());
    let mut output = cursor
        .then(|mut v: Item| { v.n += 1; v })
        .distribute(edge)
        .output(8)
        .unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(item("a", 1)).await.unwrap();
    tx.send(item("b", 2)).await.unwrap();
    drop(tx);

    assert_eq!(output.recv().await.unwrap(), item("a", 2));
    assert_eq!(output.recv().await.unwrap(), item("b", 3));
    token.cancel();
}

/// A `Distribute` edge that fails delivery drops the payload silently —
/// same as any other caught fault — and the stream keeps flowing for
/// branches that don't go through it.
#[tokio::test]
async fn distribute_edge_failure_does_not_stop_the_stream() {
    let (tx, rx) = source(8);
    let (handle, cursor) = sluice::new("distribute-fail", rx, Options::builder().build());
    let (unreliable, direct) = cursor.if_(|v: &Item| v.id == "lost");
    let mut lost_output = unreliable.distribute(Arc::new(AlwaysFailEdge)).output(8).unwrap();
    let mut direct_output = direct.output(8).unwrap();

    let token = CancellationToken::new();
    handle.start(token.clone()).unwrap();

    tx.send(item("lost", 1)).await.unwrap();
    tx.send(item("kept", 2)).await.unwrap();
    drop(tx);

    assert_eq!(direct_output.recv().await.unwrap().id, "kept");
    assert!(lost_output.try_recv().is_none());
    token.cancel();
}
