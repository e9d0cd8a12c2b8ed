//! The mock request object and its lifecycle.
//!
//! # Design
//! `MockXhr` is a cheap `Rc` handle around the request state, its two event
//! targets (the request itself and `upload`), and the collaborators it was
//! built with: a `HandlerRegistry` and a `Scheduler`. Nothing global is read
//! from here.
//!
//! `send` never resolves inline. It defers a resolution step to the
//! scheduler and records the task id. Every deferred step also captures the
//! request's generation number; `open`, `abort` and a new `send` bump it, so
//! a step that slips past cancellation still finds a stale generation and
//! does nothing.
//!
//! State is mutated inside short `RefCell` borrows and events are dispatched
//! after the borrow ends, so listeners can read the request, `abort` it, or
//! even `open` it again. After each dispatch that user code could have
//! reacted to, the generation is checked again before continuing.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::{ReadyStateMode, ValidationPolicy, XhrConfig};
use crate::environment::MockEnvironment;
use crate::error::XhrError;
use crate::event::{Event, EventKind, EventTarget, Listener};
use crate::handler::{HandlerRegistry, Outcome};
use crate::http::{Headers, HttpMethod, HttpRequest, HttpResponse};
use crate::scheduler::{Scheduler, TaskId};

/// Value of `response_type` once a response has been applied.
pub const RESPONSE_TYPE_TEXT: &str = "text";

/// Lifecycle state of a request, ordered the way it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl ReadyState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadyState::Unsent => "UNSENT",
            ReadyState::Opened => "OPENED",
            ReadyState::HeadersReceived => "HEADERS_RECEIVED",
            ReadyState::Loading => "LOADING",
            ReadyState::Done => "DONE",
        })
    }
}

struct XhrState {
    request: HttpRequest,
    ready_state: ReadyState,
    status: u16,
    status_text: String,
    response_headers: Headers,
    headers_received: bool,
    response: Option<String>,
    response_text: Option<String>,
    response_type: Option<&'static str>,
    timeout: Duration,
    with_credentials: bool,
    pending: Option<TaskId>,
    generation: u64,
}

impl XhrState {
    fn new(config: &XhrConfig) -> Self {
        Self {
            request: HttpRequest::default(),
            ready_state: ReadyState::Unsent,
            status: 0,
            status_text: String::new(),
            response_headers: Headers::new(),
            headers_received: false,
            response: None,
            response_text: None,
            response_type: None,
            timeout: config.timeout(),
            with_credentials: config.with_credentials,
            pending: None,
            generation: 0,
        }
    }

    fn clear_response(&mut self) {
        self.status = 0;
        self.status_text.clear();
        self.response_headers.clear();
        self.headers_received = false;
        self.response = None;
        self.response_text = None;
        self.response_type = None;
    }

    /// Invalidate any deferred step and hand back its task id for
    /// cancellation.
    fn invalidate(&mut self) -> Option<TaskId> {
        self.generation += 1;
        self.pending.take()
    }
}

struct Inner {
    state: RefCell<XhrState>,
    events: EventTarget,
    upload: EventTarget,
    on_ready_state_change: RefCell<Option<Rc<dyn Fn()>>>,
    registry: Arc<HandlerRegistry>,
    scheduler: Rc<dyn Scheduler>,
    policy: ValidationPolicy,
    mode: ReadyStateMode,
}

/// A mock browser HTTP request object answered by registered handlers.
#[derive(Clone)]
pub struct MockXhr {
    inner: Rc<Inner>,
}

/// Non-owning handle to a `MockXhr`, for listeners that need to read the
/// request they are attached to without keeping it alive.
#[derive(Clone)]
pub struct WeakXhr(Weak<Inner>);

impl WeakXhr {
    pub fn upgrade(&self) -> Option<MockXhr> {
        self.0.upgrade().map(|inner| MockXhr { inner })
    }
}

impl Default for MockXhr {
    fn default() -> Self {
        Self::new()
    }
}

impl MockXhr {
    /// A request wired to the process-wide handler registry and this
    /// thread's default task queue.
    pub fn new() -> Self {
        MockEnvironment::default().create()
    }

    pub fn with_parts(
        registry: Arc<HandlerRegistry>,
        scheduler: Rc<dyn Scheduler>,
        config: &XhrConfig,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(XhrState::new(config)),
                events: EventTarget::new(),
                upload: EventTarget::new(),
                on_ready_state_change: RefCell::new(None),
                registry,
                scheduler,
                policy: config.policy,
                mode: config.ready_state_mode,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakXhr {
        WeakXhr(Rc::downgrade(&self.inner))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Asynchronous `open` without credentials.
    pub fn open(&self, method: &str, url: &str) {
        self.open_with(method, url, true, None, None);
    }

    /// Reset the object for a new request. Valid in any state.
    pub fn open_with(
        &self,
        method: &str,
        url: &str,
        is_async: bool,
        user: Option<&str>,
        password: Option<&str>,
    ) {
        let stale = {
            let mut state = self.inner.state.borrow_mut();
            let stale = state.invalidate();
            state.clear_response();
            state.request = HttpRequest {
                id: Uuid::new_v4(),
                method: HttpMethod::from(method),
                url: url.to_string(),
                is_async,
                user: user.map(str::to_string),
                password: password.map(str::to_string),
                headers: Headers::new(),
                body: None,
            };
            state.ready_state = ReadyState::Opened;
            debug!(request_id = %state.request.id, method = %state.request.method, url, "opened");
            stale
        };
        self.cancel(stale);
    }

    pub fn set_request_header(&self, name: &str, value: &str) -> Result<(), XhrError> {
        let mut state = self.inner.state.borrow_mut();
        self.inner
            .policy
            .check_set_header(state.ready_state, state.pending.is_some())?;
        state.request.headers.set(name, value);
        Ok(())
    }

    /// Start answering the request. Returns before any handler runs; the
    /// result is reported through events once the scheduler gets to it.
    pub fn send(&self, body: Option<String>) -> Result<(), XhrError> {
        let (stale, generation) = {
            let mut state = self.inner.state.borrow_mut();
            self.inner
                .policy
                .check_send(state.ready_state, state.pending.is_some())?;

            let stale = state.invalidate();
            if state.ready_state == ReadyState::Done {
                // Sending a finished request again reuses its parameters.
                state.clear_response();
                state.request.id = Uuid::new_v4();
            }
            state.request.body = body;
            state.ready_state = match self.inner.mode {
                ReadyStateMode::Shortcut => ReadyState::Loading,
                ReadyStateMode::Standard => ReadyState::Opened,
            };
            debug!(
                request_id = %state.request.id,
                method = %state.request.method,
                url = %state.request.url,
                "sent"
            );
            (stale, state.generation)
        };
        self.cancel(stale);

        let weak = self.downgrade();
        let task = self.inner.scheduler.defer(
            Duration::ZERO,
            Box::new(move || {
                if let Some(xhr) = weak.upgrade() {
                    xhr.resolve(generation);
                }
            }),
        );
        self.inner.state.borrow_mut().pending = Some(task);
        Ok(())
    }

    /// Cancel the request. Emits `abort` on `upload` and then on the request
    /// when a request was in progress.
    pub fn abort(&self) {
        let (stale, interrupted) = {
            let mut state = self.inner.state.borrow_mut();
            let stale = state.invalidate();
            let interrupted =
                state.ready_state > ReadyState::Unsent && state.ready_state < ReadyState::Done;
            if interrupted {
                state.ready_state = ReadyState::Unsent;
                state.headers_received = false;
                debug!(request_id = %state.request.id, "aborted");
            }
            (stale, interrupted)
        };
        self.cancel(stale);

        if interrupted {
            self.inner.upload.trigger(EventKind::Abort, None);
            self.trigger(EventKind::Abort, None);
        }
    }

    pub fn override_mime_type(&self, _mime: &str) -> Result<(), XhrError> {
        Err(XhrError::NotImplemented("overriding the response MIME type"))
    }

    fn cancel(&self, task: Option<TaskId>) {
        if let Some(task) = task {
            self.inner.scheduler.cancel(task);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.state.borrow().generation == generation
    }

    fn resolve(&self, generation: u64) {
        let request = {
            let mut state = self.inner.state.borrow_mut();
            if state.generation != generation {
                return;
            }
            state.pending = None;
            state.request.clone()
        };

        match self.inner.registry.resolve(&request) {
            Outcome::NoHandlerMatched => {
                debug!(request_id = %request.id, url = %request.url, "no handler matched");
                self.finish(EventKind::Error);
            }
            Outcome::TimedOut(delay) => self.schedule_timeout(generation, delay),
            Outcome::Responded(response) => self.apply_response(generation, response),
        }
    }

    fn schedule_timeout(&self, generation: u64, delay: Option<Duration>) {
        let delay = {
            let state = self.inner.state.borrow();
            delay.unwrap_or_else(|| state.timeout.saturating_add(Duration::from_millis(1)))
        };
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "simulating timeout"
        );

        let weak = self.downgrade();
        let task = self.inner.scheduler.defer(
            delay,
            Box::new(move || {
                if let Some(xhr) = weak.upgrade() {
                    if xhr.is_current(generation) {
                        xhr.inner.state.borrow_mut().pending = None;
                        xhr.finish(EventKind::Timeout);
                    }
                }
            }),
        );
        self.inner.state.borrow_mut().pending = Some(task);
    }

    fn apply_response(&self, generation: u64, response: HttpResponse) {
        self.inner.upload.trigger(EventKind::Load, None);
        if !self.is_current(generation) {
            return;
        }

        {
            let mut state = self.inner.state.borrow_mut();
            state.status = response.status;
            state.status_text = response.status_text;
            state.response_headers = response.headers.to_lowercase_names();
            state.headers_received = true;
            state.response_type = Some(RESPONSE_TYPE_TEXT);
            state.response_text = response.body.clone();
            state.response = response.body;
            debug!(request_id = %state.request.id, status = state.status, "response applied");
        }

        if self.inner.mode == ReadyStateMode::Standard {
            for step in [ReadyState::HeadersReceived, ReadyState::Loading] {
                self.inner.state.borrow_mut().ready_state = step;
                self.notify_ready_state_change();
                if !self.is_current(generation) {
                    return;
                }
            }
        }
        self.finish(EventKind::Load);
    }

    /// Headers are readable once the request is DONE, or past OPENED with a
    /// response applied.
    fn headers_ready(state: &XhrState) -> bool {
        state.ready_state == ReadyState::Done
            || (state.ready_state >= ReadyState::HeadersReceived && state.headers_received)
    }

    fn finish(&self, kind: EventKind) {
        self.inner.state.borrow_mut().ready_state = ReadyState::Done;
        self.trigger(kind, None);
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Dispatch `kind` on the request: the ready-state callback first, then
    /// the `on<kind>` hook, then listeners.
    pub fn trigger(&self, kind: EventKind, detail: Option<serde_json::Value>) {
        self.notify_ready_state_change();
        self.inner.events.trigger(kind, detail);
    }

    fn notify_ready_state_change(&self) {
        let callback = self.inner.on_ready_state_change.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn on(&self, kind: EventKind, listener: impl Fn(&Event) + 'static) -> &Self {
        self.inner.events.on(kind, listener);
        self
    }

    /// Fill the single `on<kind>` slot, replacing any previous hook.
    pub fn set_hook(&self, kind: EventKind, hook: impl Fn(&Event) + 'static) {
        let hook: Listener = Rc::new(hook);
        self.inner.events.set_hook(kind, Some(hook));
    }

    pub fn clear_hook(&self, kind: EventKind) {
        self.inner.events.set_hook(kind, None);
    }

    pub fn set_onreadystatechange(&self, callback: impl Fn() + 'static) {
        *self.inner.on_ready_state_change.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn clear_onreadystatechange(&self) {
        *self.inner.on_ready_state_change.borrow_mut() = None;
    }

    pub fn events(&self) -> &EventTarget {
        &self.inner.events
    }

    pub fn upload(&self) -> &EventTarget {
        &self.inner.upload
    }

    // -----------------------------------------------------------------------
    // Response accessors
    // -----------------------------------------------------------------------

    /// Every response header as `name: value\r\n` lines, or `None` until
    /// headers are ready. A request that ended in `error` or `timeout` lists
    /// nothing.
    pub fn get_all_response_headers(&self) -> Option<String> {
        let state = self.inner.state.borrow();
        if !Self::headers_ready(&state) {
            return None;
        }
        Some(
            state
                .response_headers
                .iter()
                .map(|(name, value)| format!("{name}: {value}\r\n"))
                .collect(),
        )
    }

    pub fn get_response_header(&self, name: &str) -> Option<String> {
        let state = self.inner.state.borrow();
        if !Self::headers_ready(&state) {
            return None;
        }
        state
            .response_headers
            .get(&name.to_ascii_lowercase())
            .map(str::to_string)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.state.borrow().ready_state
    }

    pub fn status(&self) -> u16 {
        self.inner.state.borrow().status
    }

    pub fn status_text(&self) -> String {
        self.inner.state.borrow().status_text.clone()
    }

    pub fn response(&self) -> Option<String> {
        self.inner.state.borrow().response.clone()
    }

    pub fn response_text(&self) -> Option<String> {
        self.inner.state.borrow().response_text.clone()
    }

    pub fn response_type(&self) -> Option<&'static str> {
        self.inner.state.borrow().response_type
    }

    /// Always `None`: XML documents are never built.
    pub fn response_xml(&self) -> Option<String> {
        None
    }

    // -----------------------------------------------------------------------
    // Request accessors
    // -----------------------------------------------------------------------

    /// Snapshot of the request as handlers will see it.
    pub fn request(&self) -> HttpRequest {
        self.inner.state.borrow().request.clone()
    }

    pub fn method(&self) -> HttpMethod {
        self.inner.state.borrow().request.method.clone()
    }

    pub fn url(&self) -> String {
        self.inner.state.borrow().request.url.clone()
    }

    pub fn request_headers(&self) -> Headers {
        self.inner.state.borrow().request.headers.clone()
    }

    pub fn request_body(&self) -> Option<String> {
        self.inner.state.borrow().request.body.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.state.borrow().timeout
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.state.borrow_mut().timeout = timeout;
    }

    pub fn with_credentials(&self) -> bool {
        self.inner.state.borrow().with_credentials
    }

    pub fn set_with_credentials(&self, with_credentials: bool) {
        self.inner.state.borrow_mut().with_credentials = with_credentials;
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.inner.registry
    }
}

impl fmt::Debug for MockXhr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("MockXhr")
            .field("ready_state", &state.ready_state)
            .field("method", &state.request.method)
            .field("url", &state.request.url)
            .field("status", &state.status)
            .finish()
    }
}
