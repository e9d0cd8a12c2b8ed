//! Deferred-callback scheduling.
//!
//! # Design
//! The request object never runs resolution inside the call that triggered
//! it. It hands a closure to a `Scheduler` and keeps the returned `TaskId`
//! so `abort` can cancel it. `TaskQueue` is the deterministic implementation
//! used by tests: a virtual clock plus a timer heap, driven explicitly with
//! `run_ready`, `advance` and `run_until_idle`. Everything is single
//! threaded; a task is removed from the queue before it runs, so tasks may
//! schedule or cancel other tasks freely.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Identifies a scheduled task for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

pub trait Scheduler {
    /// Run `task` after `delay`, never before the current call returns.
    fn defer(&self, delay: Duration, task: Task) -> TaskId;

    /// Prevent a scheduled task from running. Unknown or finished ids are
    /// ignored.
    fn cancel(&self, id: TaskId);
}

#[derive(Default)]
struct QueueState {
    now: Duration,
    next_id: u64,
    timers: BinaryHeap<Reverse<(Duration, TaskId)>>,
    tasks: HashMap<TaskId, Task>,
}

/// Virtual-clock task queue.
///
/// Tasks due at the same instant run in scheduling order.
#[derive(Clone, Default)]
pub struct TaskQueue {
    state: Rc<RefCell<QueueState>>,
}

thread_local! {
    static THREAD_DEFAULT: TaskQueue = TaskQueue::new();
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue backing `MockEnvironment::default()` on this thread.
    pub fn thread_default() -> TaskQueue {
        THREAD_DEFAULT.with(TaskQueue::clone)
    }

    /// Virtual time elapsed since the queue was created.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of tasks still waiting to run.
    pub fn pending(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Run every task due at the current instant, including tasks they
    /// schedule with zero delay. Returns the number of tasks run.
    pub fn run_ready(&self) -> usize {
        let now = self.now();
        self.run_due(now)
    }

    /// Move the clock forward by `by`, running tasks as their due time is
    /// reached.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = self.now() + by;
        let ran = self.run_due(deadline);
        self.state.borrow_mut().now = deadline;
        ran
    }

    /// Run until nothing is left, jumping the clock to each due time.
    pub fn run_until_idle(&self) -> usize {
        self.run_due(Duration::MAX)
    }

    fn run_due(&self, deadline: Duration) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due(deadline) {
            task();
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, deadline: Duration) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        while let Some(Reverse((due, id))) = state.timers.peek().copied() {
            if due > deadline {
                return None;
            }
            state.timers.pop();
            // Cancelled tasks leave their timer behind.
            if let Some(task) = state.tasks.remove(&id) {
                state.now = state.now.max(due);
                trace!(
                    task = id.0,
                    due_ms = u64::try_from(due.as_millis()).unwrap_or(u64::MAX),
                    "running deferred task"
                );
                return Some(task);
            }
        }
        None
    }
}

impl Scheduler for TaskQueue {
    fn defer(&self, delay: Duration, task: Task) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_id);
        state.next_id += 1;
        let due = state.now.saturating_add(delay);
        state.timers.push(Reverse((due, id)));
        state.tasks.insert(id, task);
        id
    }

    fn cancel(&self, id: TaskId) {
        if self.state.borrow_mut().tasks.remove(&id).is_some() {
            trace!(task = id.0, "cancelled deferred task");
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("TaskQueue")
            .field("now", &state.now)
            .field("pending", &state.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[derive(Clone, Default)]
    struct RunCounter(Rc<Cell<usize>>);

    impl RunCounter {
        fn bump(&self) {
            self.0.set(self.0.get() + 1);
        }

        fn get(&self) -> usize {
            self.0.get()
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn log_task(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Task {
        let log = log.clone();
        Box::new(move || log.borrow_mut().push(tag))
    }

    #[test]
    fn deferred_task_does_not_run_inline() {
        let queue = TaskQueue::new();
        let counter = RunCounter::default();
        let c = counter.clone();
        queue.defer(Duration::ZERO, Box::new(move || c.bump()));

        assert_eq!(counter.get(), 0);
        assert_eq!(queue.run_ready(), 1);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn same_instant_tasks_run_in_scheduling_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        queue.defer(ms(5), log_task(&log, "b"));
        queue.defer(Duration::ZERO, log_task(&log, "a"));
        queue.defer(ms(5), log_task(&log, "c"));

        queue.run_until_idle();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(queue.now(), ms(5));
    }

    #[test]
    fn advance_only_runs_due_tasks() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        queue.defer(ms(10), log_task(&log, "early"));
        queue.defer(ms(30), log_task(&log, "late"));

        assert_eq!(queue.advance(ms(20)), 1);
        assert_eq!(*log.borrow(), vec!["early"]);
        assert_eq!(queue.now(), ms(20));
        assert_eq!(queue.pending(), 1);

        queue.advance(ms(10));
        assert_eq!(*log.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let queue = TaskQueue::new();
        let counter = RunCounter::default();
        let c = counter.clone();
        let id = queue.defer(Duration::ZERO, Box::new(move || c.bump()));
        queue.cancel(id);

        assert_eq!(queue.run_until_idle(), 0);
        assert_eq!(counter.get(), 0);
        assert!(queue.is_idle());
    }

    #[test]
    fn cancelling_twice_is_harmless() {
        let queue = TaskQueue::new();
        let id = queue.defer(Duration::ZERO, Box::new(|| {}));
        queue.run_ready();
        queue.cancel(id);
        queue.cancel(id);
        assert!(queue.is_idle());
    }

    #[test]
    fn tasks_can_schedule_follow_up_work() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_queue = queue.clone();
        let inner_log = log.clone();
        queue.defer(
            Duration::ZERO,
            Box::new(move || {
                inner_log.borrow_mut().push("first");
                inner_queue.defer(Duration::ZERO, log_task(&inner_log, "same-turn"));
                inner_queue.defer(ms(3), log_task(&inner_log, "later"));
            }),
        );

        queue.run_ready();
        assert_eq!(*log.borrow(), vec!["first", "same-turn"]);
        queue.advance(ms(3));
        assert_eq!(*log.borrow(), vec!["first", "same-turn", "later"]);
    }

    #[test]
    fn thread_default_is_shared_within_a_thread() {
        let a = TaskQueue::thread_default();
        let b = TaskQueue::thread_default();
        assert!(Rc::ptr_eq(&a.state, &b.state));
    }
}
