//! Handler registry and the resolution chain.
//!
//! # Design
//! A handler is a pure decision function over request data: it looks at the
//! `HttpRequest`, and either hands back a `ResponseBuilder` describing the
//! answer or returns `None` to let the next handler try. The registry keeps
//! handlers in registration order. Resolution works on a snapshot of the
//! list, so no lock is held while user code runs and a handler cannot change
//! the chain it is part of.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::XhrError;
use crate::http::{HttpRequest, HttpResponse};
use crate::response::ResponseBuilder;

/// A request handler.
pub type Handler = Arc<dyn Fn(&HttpRequest, ResponseBuilder) -> Option<ResponseBuilder> + Send + Sync>;

/// What a single `send` resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoHandlerMatched,
    /// Simulate a timeout. `None` means the default delay.
    TimedOut(Option<Duration>),
    Responded(HttpResponse),
}

static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();

/// Ordered, append-only list of request handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by `MockEnvironment::default()`.
    pub fn global() -> Arc<HandlerRegistry> {
        GLOBAL.get_or_init(|| Arc::new(HandlerRegistry::new())).clone()
    }

    pub fn add_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn(&HttpRequest, ResponseBuilder) -> Option<ResponseBuilder> + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
        self
    }

    /// Not supported. Always fails so callers notice instead of silently
    /// keeping a handler they meant to drop.
    pub fn remove_handler(&self, _handler: &Handler) -> Result<&Self, XhrError> {
        Err(XhrError::NotImplemented("removing a request handler"))
    }

    /// Drop every registered handler.
    pub fn reset(&self) {
        self.handlers.write().clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Run the chain for `request`. The first handler that returns a builder
    /// decides the outcome.
    pub fn resolve(&self, request: &HttpRequest) -> Outcome {
        let snapshot: Vec<Handler> = self.handlers.read().clone();
        for (index, handler) in snapshot.iter().enumerate() {
            if let Some(builder) = handler(request, ResponseBuilder::new()) {
                trace!(request_id = %request.id, handler = index, "handler produced a response");
                return builder.into_outcome();
            }
        }
        trace!(request_id = %request.id, handlers = snapshot.len(), "no handler matched");
        Outcome::NoHandlerMatched
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
