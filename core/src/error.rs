//! Error types for the mock request object.
//!
//! # Design
//! Lifecycle failures (unhandled request, simulated timeout) are never
//! errors here: they are delivered as events on the request object, the same
//! way a browser reports them. `XhrError` covers only what has no event-based
//! equivalent: features that are deliberately not implemented, out-of-order
//! calls rejected by the strict validation policy, and setup problems
//! (config parsing, builder serialization).

use thiserror::Error;

use crate::xhr::ReadyState;

/// Errors returned synchronously by the mock request API.
#[derive(Debug, Error)]
pub enum XhrError {
    /// The operation exists for API compatibility but has no implementation.
    #[error("{0} hasn't been implemented yet")]
    NotImplemented(&'static str),

    /// The strict validation policy rejected a call made in the wrong state.
    #[error("cannot {operation} while the request is {state}")]
    InvalidState {
        operation: &'static str,
        state: ReadyState,
    },

    /// A response body could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}
