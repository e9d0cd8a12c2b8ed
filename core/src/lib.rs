//! In-process test double for a browser HTTP request object.
//!
//! # Overview
//! `MockXhr` exposes the familiar request-object surface (`open`,
//! `set_request_header`, `send`, `abort`, response getters, lifecycle
//! events) but never touches the network. Each `send` is answered by the
//! first registered handler that returns a `ResponseBuilder`; a handler can
//! also ask for a simulated timeout, and an unanswered request ends in an
//! `error` event.
//!
//! # Design
//! - Resolution is always deferred to a `Scheduler`. `TaskQueue` gives tests
//!   a virtual clock they drive explicitly; `TokioScheduler` runs the same
//!   steps on a tokio `LocalSet`.
//! - Handlers live in a `HandlerRegistry` passed in through a
//!   `MockEnvironment`; only `MockEnvironment::default()` reaches for the
//!   process-wide registry.
//! - Lifecycle outcomes are events, not errors. `XhrError` is reserved for
//!   unimplemented features, strict-policy violations and setup mistakes.

pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod handler;
pub mod http;
pub mod response;
pub mod scheduler;
pub mod tokio_scheduler;
pub mod xhr;

pub use config::{ReadyStateMode, ValidationPolicy, XhrConfig};
pub use environment::MockEnvironment;
pub use error::XhrError;
pub use event::{Event, EventKind, EventTarget, Listener};
pub use handler::{Handler, HandlerRegistry, Outcome};
pub use http::{Headers, HttpMethod, HttpRequest, HttpResponse};
pub use response::{ResponseBuilder, TimeoutDelay};
pub use scheduler::{Scheduler, Task, TaskId, TaskQueue};
pub use tokio_scheduler::TokioScheduler;
pub use xhr::{MockXhr, ReadyState, WeakXhr, RESPONSE_TYPE_TEXT};
