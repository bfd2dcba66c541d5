//! The element type that flows through a stream.

use std::borrow::Cow;

/// Exposes a stable textual identity for a payload.
///
/// The engine uses this identity for tracing, attaching it as a span field
/// on every handler invocation. Everything else about `T` is opaque to the
/// engine; `memoize` keys are supplied explicitly by the caller rather than
/// falling back to `id()`, since a good tracing identity and a good memo
/// key are rarely the same string.
pub trait Identify {
    /// Returns this payload's stable identity.
    fn id(&self) -> Cow<'_, str>;
}

impl<T: Identify + ?Sized> Identify for &T {
    fn id(&self) -> Cow<'_, str> {
        (**self).id()
    }
}

/// A composite trait for types usable as payloads in a stream.
///
/// Mirrors the teacher's `Data: Clone + 'static` bound: anything cloneable,
/// sendable across worker tasks, and carrying a stable [`Identify`] identity
/// qualifies. `Clone` is required because `Tee` and panic reporting both need
/// an independent copy of a payload without involving the handler.
pub trait Payload: Identify + Clone + Send + 'static {}
impl<T: Identify + Clone + Send + 'static> Payload for T {}
