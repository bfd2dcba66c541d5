//! The smallest possible stream: one `Then` vertex between a source and an
//! `Output`, run to completion.

use std::borrow::Cow;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct Item {
    id: String,
    n: u64,
}

impl sluice::Identify for Item {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.id)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let (tx, rx) = mpsc::channel(8);
    let (handle, cursor) = sluice::new("hello", ReceiverStream::new(rx), sluice::Options::builder().fifo(true).build());
    let mut output = cursor.then(|mut item: Item| {
        item.n += 10;
        item
    }).output(8).expect("single linear branch always terminates");

    let token = CancellationToken::new();
    handle.start(token.clone()).expect("graph is structurally complete");

    for (id, n) in [("a", 1), ("b", 2), ("c", 3)] {
        tx.send(Item { id: id.to_string(), n }).await.unwrap();
    }
    drop(tx);

    while let Some(item) = output.recv().await {
        println!("{} -> {}", item.id, item.n);
    }

    token.cancel();
}
