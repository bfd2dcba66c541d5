//! Recursive, memoized Fibonacci spliced through a `Transform` boundary.

use std::borrow::Cow;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct Request {
    id: String,
    n: u64,
}

impl sluice::Identify for Request {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.id)
    }
}

#[derive(Clone, Debug)]
struct Answer(u64);

impl sluice::Identify for Answer {
    fn id(&self) -> Cow<'_, str> {
        Cow::Owned(self.0.to_string())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let (tx, rx) = mpsc::channel(8);
    let (handle, cursor) = sluice::new("fib", ReceiverStream::new(rx), sluice::Options::builder().build());

    let fib = sluice::memoize::<Request, _, _>(
        |me, req| {
            if req.n < 2 {
                req
            } else {
                let a = me.call(Request { id: req.id.clone(), n: req.n - 1 }).n;
                let b = me.call(Request { id: req.id.clone(), n: req.n - 2 }).n;
                Request { id: req.id, n: a + b }
            }
        },
        |req| req.n.to_string(),
    );

    let memoized = cursor.memoize(fib);
    let mut output = memoized
        .transform(|req| Answer(req.n), sluice::Options::builder().build())
        .expect("branch has not terminated yet")
        .output(8)
        .expect("single linear branch always terminates");

    let token = CancellationToken::new();
    handle.start(token.clone()).expect("graph is structurally complete");

    tx.send(Request { id: "k".to_string(), n: 5 }).await.unwrap();
    println!("fib(5) = {}", output.recv().await.unwrap().0);

    tx.send(Request { id: "k".to_string(), n: 11 }).await.unwrap();
    println!("fib(11) = {}", output.recv().await.unwrap().0);

    drop(tx);
    token.cancel();
}
