//! The `Transform` bridge: splices a fresh, independently-typed stream onto
//! the output of a `T` cursor.

use std::any::Any;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::payload::Payload;

/// Type-erases the target payload type `U` so a `Transform` vertex can sit
/// in a `Handler<T>` without `Handler` itself being generic over `U`.
///
/// `try_apply` evaluates the mapping function synchronously, under
/// `catch_unwind` at the call site, and returns only a future for the
/// subsequent (infallible, backpressured) forwarding send — so a panic
/// inside the map never reaches the async send.
pub(crate) trait Bridge<T>: Send + Sync {
    fn try_apply(&self, payload: T) -> Result<BoxFuture<'static, ()>, Box<dyn Any + Send>>;
}

pub(crate) struct TypedBridge<T, U, F> {
    pub map: F,
    pub sender: mpsc::Sender<U>,
    pub _marker: PhantomData<fn(T)>,
}

impl<T, U, F> Bridge<T> for TypedBridge<T, U, F>
where
    T: Payload,
    U: Payload,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    fn try_apply(&self, payload: T) -> Result<BoxFuture<'static, ()>, Box<dyn Any + Send>> {
        let map = &self.map;
        let mapped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| map(payload)))?;
        let sender = self.sender.clone();
        Ok(Box::pin(async move {
            let _ = sender.send(mapped).await;
        }))
    }
}
