//! Shared scheduler plumbing: the `DispatchQueueService` trait every
//! scheduler implements, and `ThreadAccessGuard`, the thread-local
//! re-entrancy stack that answers "is the calling thread currently
//! running a task dispatched by queue X" — the piece `has_thread_access`
//! and the thread pool's detach-on-reentrant-`await_termination` logic
//! both depend on.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dispatch::task::DispatchTask;

static NEXT_SCHEDULER_ID: AtomicUsize = AtomicUsize::new(1);

/// Allocates a process-wide unique id for a new scheduler instance, used
/// as the key into [`ThreadAccessGuard`]'s thread-local stack.
pub(crate) fn next_scheduler_id() -> usize {
    NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed)
}

thread_local! {
    static ACCESS_STACK: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// Pushed onto the calling thread's access stack for the duration of
/// running one task from scheduler `id`; `has_thread_access` and
/// `await_termination`'s reentrancy check both consult the stack rather
/// than a single flag, since a task can itself post to (and thus
/// recursively run on) the same queue.
pub(crate) struct ThreadAccessGuard {
    id: usize,
}

impl ThreadAccessGuard {
    pub(crate) fn enter(id: usize) -> Self {
        ACCESS_STACK.with(|stack| stack.borrow_mut().push(id));
        ThreadAccessGuard { id }
    }

    pub(crate) fn has_access(id: usize) -> bool {
        ACCESS_STACK.with(|stack| stack.borrow().contains(&id))
    }
}

impl Drop for ThreadAccessGuard {
    fn drop(&mut self) {
        ACCESS_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|entry| *entry == self.id) {
                stack.remove(pos);
            }
        });
    }
}

/// Runs `task`, catching a panic instead of propagating it up through the
/// worker/pump loop: a misbehaving task degrades to a logged, swallowed
/// panic rather than taking the whole scheduler down with it.
pub(crate) fn invoke_caught(task: DispatchTask) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (task.run)()));
    if result.is_err() {
        crate::log!(
            invoke_task,
            Yellow,
            crate::error::Tag::DispatchTaskPanic,
            "dispatch task panicked; continuing"
        );
    }
}

/// `shutdown`'s cancellation policy: drain what's
/// already queued before stopping, or cancel it outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAction {
    /// Let tasks already posted run to completion; just stop accepting
    /// new ones.
    DrainThenStop,
    /// Discard every task that hasn't started running yet.
    CancelRemaining,
}

/// The common surface every dispatch queue implementation exposes.
pub trait DispatchQueueService: Send + Sync {
    /// Enqueues `task`. Returns `false` without running it if the queue
    /// has already been shut down.
    fn post(&self, task: DispatchTask) -> bool;

    /// Pops the next runnable task without running it, if any is ready.
    fn try_dequeue_task(&self) -> Option<DispatchTask>;

    fn has_tasks(&self) -> bool;

    /// Runs a task that was already dequeued, with the thread-access
    /// bookkeeping and panic containment every scheduler needs.
    fn invoke_task(&self, task: DispatchTask);

    /// True if the calling thread is currently running a task dispatched
    /// by this queue (including recursively, via a task that posts to
    /// and then drains its own queue).
    fn has_thread_access(&self) -> bool;

    /// True if this queue never runs more than one task concurrently.
    fn is_serial(&self) -> bool;

    fn shutdown(&self, action: ShutdownAction);

    fn is_shutdown(&self) -> bool;

    /// Blocks the calling thread until every task posted before
    /// `shutdown()` has drained, *unless* the calling thread is itself
    /// running inside this queue, in which case the call detaches instead
    /// of deadlocking.
    fn await_termination(&self);
}
