//! The error taxonomy surfaced by the builder and by pluggable edges.
//!
//! `HandlerPanic` is deliberately absent from this enum: a panicking handler
//! is never reported as a `Result`, only through the configured panic
//! handler and through `tracing` (see [`crate::telemetry`]).

use thiserror::Error;

/// Structural failures raised by the builder and by `Stream::start`.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A branch of the graph reaches neither `Output`, `Drop`, nor
    /// `Distribute` before the graph is started.
    #[error("stream `{stream}` has an unterminated branch at vertex `{vertex}`")]
    GraphIncomplete {
        /// The stream this vertex belongs to.
        stream: String,
        /// The vertex with a dangling output.
        vertex: String,
    },

    /// The builder was used illegally: a duplicate vertex id, or a
    /// `Transform` attempted on a branch that has already looped or
    /// terminated.
    #[error("graph misuse in stream `{stream}`: {reason}")]
    GraphMisuse {
        /// The stream this misuse occurred in.
        stream: String,
        /// A human-readable description of the misuse.
        reason: String,
    },
}

/// Failures reported by a pluggable [`crate::edge::Edge`] implementation.
///
/// The engine never interprets these beyond surfacing them to the caller
/// that attempted the delivery or bind; retries, if wanted, belong to the
/// edge implementation itself.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// The edge's downstream consumer has gone away.
    #[error("edge is closed")]
    Closed,

    /// `bind` was called more than once on the same edge.
    #[error("edge already bound to a downstream consumer")]
    AlreadyBound,

    /// A transport-specific failure reported by an external adapter.
    #[error("external edge failure: {0}")]
    External(String),
}
