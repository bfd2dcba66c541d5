//! The tracing-based telemetry wrap around every handler invocation.
//!
//! Every vertex gets a per-batch counter (`vertex/count`), a duration
//! histogram (`vertex/duration`), and a panic counter (`vertex/panics`),
//! all labelled with stream id, vertex id, and vertex kind, with a span
//! opened per handler invocation and the payload id attached as a span
//! field. These are emitted as `tracing` spans and events rather than
//! through a dedicated metrics crate, so a host process bridges them to a
//! real counter/histogram backend by attaching its own `tracing_subscriber`
//! layer instead of `sluice` committing to one itself.

use std::time::Duration;

use tracing::Span;

use crate::vertex::VertexKind;

/// Opens the per-vertex span each worker task runs under for its whole
/// lifetime. Caller attributes (`Options::attributes`) are folded in as a
/// single joined field since `tracing`'s field set is fixed at the
/// macro-invocation site.
pub(crate) fn vertex_span(stream_id: &str, vertex_id: &str, kind: VertexKind, attributes: &[(String, String)]) -> Span {
    let attrs = attributes.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
    tracing::info_span!("vertex", stream = %stream_id, vertex = %vertex_id, kind = %kind.as_str(), attrs = %attrs)
}

/// Opens the span for one handler invocation, nested under `parent`, with
/// the triggering payload's id attached.
pub(crate) fn invocation_span(parent: &Span, payload_id: &str) -> Span {
    tracing::debug_span!(parent: parent, "invoke", payload_id = %payload_id)
}

/// Records the `vertex/count` counter for one inbound payload.
pub(crate) fn record_batch(stream_id: &str, vertex_id: &str) {
    tracing::trace!(stream = %stream_id, vertex = %vertex_id, counter = "vertex/count", value = 1u64);
}

/// Records the `vertex/duration` histogram entry for one invocation.
pub(crate) fn record_duration(stream_id: &str, vertex_id: &str, elapsed: Duration) {
    tracing::trace!(
        stream = %stream_id,
        vertex = %vertex_id,
        histogram = "vertex/duration",
        duration_ms = elapsed.as_secs_f64() * 1000.0,
    );
}

/// Records the `vertex/panics` counter for one caught panic.
pub(crate) fn record_panic(stream_id: &str, vertex_id: &str) {
    tracing::warn!(stream = %stream_id, vertex = %vertex_id, counter = "vertex/panics", value = 1u64);
}
