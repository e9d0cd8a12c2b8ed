//! Lifecycle events and the event target they are dispatched on.
//!
//! # Design
//! Each `EventKind` has one optional hook slot (the `onload`-style property
//! of the browser object) and any number of generic listeners. The hook
//! fires first. Callbacks are cloned out of the target before they run, so a
//! listener may register more listeners or read the request object it
//! belongs to without tripping a `RefCell` borrow.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Callback invoked for an event.
pub type Listener = Rc<dyn Fn(&Event)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Load,
    Error,
    Abort,
    Timeout,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Load,
        EventKind::Error,
        EventKind::Abort,
        EventKind::Timeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Load => "load",
            EventKind::Error => "error",
            EventKind::Abort => "abort",
            EventKind::Timeout => "timeout",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub detail: Option<serde_json::Value>,
}

/// Registration and dispatch of lifecycle events.
#[derive(Default)]
pub struct EventTarget {
    hooks: RefCell<[Option<Listener>; 4]>,
    listeners: RefCell<Vec<(EventKind, Listener)>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `kind`.
    pub fn on(&self, kind: EventKind, listener: impl Fn(&Event) + 'static) -> &Self {
        self.listeners.borrow_mut().push((kind, Rc::new(listener)));
        self
    }

    /// Fill or clear the single hook slot for `kind`.
    pub fn set_hook(&self, kind: EventKind, hook: Option<Listener>) {
        self.hooks.borrow_mut()[kind.slot()] = hook;
    }

    pub fn has_hook(&self, kind: EventKind) -> bool {
        self.hooks.borrow()[kind.slot()].is_some()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn trigger(&self, kind: EventKind, detail: Option<serde_json::Value>) {
        let hook = self.hooks.borrow()[kind.slot()].clone();
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();

        trace!(event = %kind, listeners = listeners.len(), hook = hook.is_some(), "dispatching event");
        let event = Event { kind, detail };
        if let Some(hook) = hook {
            hook(&event);
        }
        for listener in listeners {
            listener(&event);
        }
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}
