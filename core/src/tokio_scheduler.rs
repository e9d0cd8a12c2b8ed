//! `Scheduler` backed by a tokio `LocalSet`.
//!
//! Deferred work becomes a local task that sleeps for its delay and then
//! runs the callback. Cancelling aborts the task. Because everything runs on
//! one thread, `cancel` always happens while the task is parked, so an
//! aborted task never gets to run its callback.
//!
//! Must be used from inside `LocalSet::run_until` (or a `LocalSet` being
//! awaited); `defer` panics otherwise, exactly like `spawn_local`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::scheduler::{Scheduler, Task, TaskId};

#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    next_id: Rc<Cell<u64>>,
    running: Rc<RefCell<HashMap<TaskId, AbortHandle>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deferred tasks that have neither run nor been cancelled.
    pub fn pending(&self) -> usize {
        self.running.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    fn defer(&self, delay: Duration, task: Task) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let running = self.running.clone();
        let handle = tokio::task::spawn_local(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            running.borrow_mut().remove(&id);
            task();
        });
        self.running.borrow_mut().insert(id, handle.abort_handle());
        id
    }

    fn cancel(&self, id: TaskId) {
        if let Some(handle) = self.running.borrow_mut().remove(&id) {
            handle.abort();
        }
    }
}
