//! `UiScheduler`: a single-threaded, cooperative dispatch queue meant to
//! be pumped by a host event loop rather than by worker threads of its
//! own. The runtime never spawns a thread for this scheduler; instead
//! every `post` mints a [`UiHandler`] — a one-shot, host-callable token —
//! and hands it to the host's dispatcher. This mirrors the split between
//! the thread-pool scheduler (owns its threads) and a UI-thread
//! counterpart (borrows whatever thread the host's main loop already
//! runs on); there is no real host event loop to hand handlers to in a
//! standalone crate, so [`UiScheduler::next_handler`] stands in for it,
//! the way a test harness simulates "the host".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::dispatch::queue::QueueService;
use crate::dispatch::scheduler::{
    self, invoke_caught, DispatchQueueService, ShutdownAction, ThreadAccessGuard,
};
use crate::dispatch::task::DispatchTask;
use crate::error::ConstructError;
use crate::interface::Interface;
use crate::make::make;
use crate::policy::{AbortOnFailure, DirectConstruct, StrongOnly};
use crate::rc::StrongRef;
use crate::Object;

/// Advisory soft deadline handed to `invoke_task` for UI-dispatched work:
/// "current time + 1/60 s".
fn frame_deadline() -> Instant {
    Instant::now() + Duration::from_millis(16)
}

#[derive(Object)]
struct Inner {
    queue: QueueService,
    id: usize,
    /// One per posted-and-not-yet-taken task, decremented atomically the
    /// moment a handler takes one.
    task_count: AtomicUsize,
    /// One per outstanding handler the host has not yet released (by
    /// invoking or discarding it).
    handler_ref_count: AtomicUsize,
    is_shutdown: AtomicBool,
    /// Guards the handful of fields `post`/`release` must update together:
    /// under the lock, if shutdown don't post; else increment task_count
    /// and create a handler.
    lock: Mutex<()>,
    /// The scheduler's self-reference, parked while any handler is
    /// in-flight so the host can't outlive the scheduler's own strong ref
    /// while still holding a handler into it (a bounded self-cycle, broken
    /// once the last handler releases).
    self_ref: Mutex<Option<StrongRef<Inner>>>,
    terminated: Mutex<bool>,
    terminated_cv: Condvar,
}

impl Interface for Inner {}

impl TryFrom<usize> for Inner {
    type Error = ConstructError;
    fn try_from(id: usize) -> Result<Self, ConstructError> {
        Ok(Inner {
            queue: QueueService::new(),
            id,
            task_count: AtomicUsize::new(0),
            handler_ref_count: AtomicUsize::new(0),
            is_shutdown: AtomicBool::new(false),
            lock: Mutex::new(()),
            self_ref: Mutex::new(None),
            terminated: Mutex::new(false),
            terminated_cv: Condvar::new(),
        })
    }
}

impl Inner {
    /// Common tail of both "a handler ran its task" and "the host
    /// discarded a handler without running it": decrement
    /// `handler_ref_count`, and if that was the last outstanding handler,
    /// check whether tasks are still stranded.
    fn release_handler(this: &StrongRef<Inner>) {
        let state = this.get().expect("Inner strong ref is never null");
        let prev = state.handler_ref_count.fetch_sub(1, Ordering::AcqRel);
        if prev != 1 {
            return;
        }
        if state.task_count.load(Ordering::Acquire) > 0 {
            // The host dropped one or more handlers without invoking them:
            // cascade into a hard shutdown.
            state.is_shutdown.store(true, Ordering::Release);
            state.queue.mark_shutdown();
            state.queue.cancel_remaining();
            state.task_count.store(0, Ordering::Release);
        }
        if state.is_shutdown.load(Ordering::Acquire) {
            Inner::signal_terminated(this);
        }
        *state.self_ref.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn signal_terminated(this: &StrongRef<Inner>) {
        let state = this.get().expect("Inner strong ref is never null");
        let mut terminated = state.terminated.lock().unwrap_or_else(|e| e.into_inner());
        if !*terminated {
            *terminated = true;
            state.terminated_cv.notify_all();
        }
    }
}

/// The host-callable unit a `post()` call mints: the host
/// invokes it exactly once (or drops it without invoking it, e.g. because
/// it discarded its queued work). Either outcome releases it exactly once;
/// a second `invoke()` or a drop after `invoke()` is a no-op.
pub struct UiHandler {
    inner: StrongRef<Inner>,
    done: AtomicBool,
}

impl UiHandler {
    fn state(&self) -> &Inner {
        self.inner.get().expect("Inner strong ref is never null")
    }

    /// Takes one task (an atomic decrement of `task_count`), dequeues it
    /// from the queue service, and invokes it with a deadline of now +
    /// 1/60s. Returns `false` without running anything if the queue had
    /// already shut down by the time this handler was invoked: a late
    /// handler no-ops rather than resurrecting work the caller already
    /// believes is cancelled.
    pub fn invoke(&self) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.state().is_shutdown.load(Ordering::Acquire) {
            Inner::release_handler(&self.inner);
            return false;
        }
        self.state().task_count.fetch_sub(1, Ordering::AcqRel);
        let _deadline = frame_deadline();
        let ran = match self.state().queue.try_dequeue() {
            Some(task) => {
                let _access = ThreadAccessGuard::enter(self.state().id);
                invoke_caught(task);
                true
            }
            None => false,
        };
        Inner::release_handler(&self.inner);
        ran
    }
}

impl Drop for UiHandler {
    fn drop(&mut self) {
        // The host discarded this handler without calling `invoke()`.
        // `task_count` is *not* decremented here: that's exactly what lets
        // `release_handler` notice tasks are stranded.
        if !self.done.swap(true, Ordering::AcqRel) {
            Inner::release_handler(&self.inner);
        }
    }
}

pub struct UiScheduler {
    inner: StrongRef<Inner>,
    /// Stand-in for "the host dispatcher" a real UI scheduler would hand
    /// handlers to directly, outside the lock; a simulated host drains
    /// this with [`UiScheduler::next_handler`].
    pending: Mutex<VecDeque<UiHandler>>,
}

impl UiScheduler {
    pub fn new() -> Self {
        let inner = make::<Inner, _, StrongOnly, DirectConstruct, AbortOnFailure>(
            scheduler::next_scheduler_id(),
        );
        UiScheduler {
            inner,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn state(&self) -> &Inner {
        self.inner.get().expect("UiScheduler::inner is never null")
    }

    /// Pops the next handler the (simulated) host hasn't picked up yet, in
    /// post order.
    pub fn next_handler(&self) -> Option<UiHandler> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    /// Runs every currently pending handler to completion, in post order —
    /// a convenience for a host that wants to drain everything ready
    /// rather than pumping one handler at a time.
    pub fn drain_pending(&self) {
        while let Some(handler) = self.next_handler() {
            handler.invoke();
        }
    }

    pub fn task_count(&self) -> usize {
        self.state().task_count.load(Ordering::Acquire)
    }

    pub fn handler_ref_count(&self) -> usize {
        self.state().handler_ref_count.load(Ordering::Acquire)
    }
}

impl Default for UiScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueueService for UiScheduler {
    fn post(&self, task: DispatchTask) -> bool {
        let _guard = self.state().lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.state().is_shutdown.load(Ordering::Acquire) {
            return false;
        }
        if !self.state().queue.post(task) {
            return false;
        }
        self.state().task_count.fetch_add(1, Ordering::AcqRel);
        let prev_handlers = self.state().handler_ref_count.fetch_add(1, Ordering::AcqRel);
        if prev_handlers == 0 {
            *self
                .state()
                .self_ref
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(self.inner.clone());
        }
        let handler = UiHandler {
            inner: self.inner.clone(),
            done: AtomicBool::new(false),
        };
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).push_back(handler);
        true
    }

    fn try_dequeue_task(&self) -> Option<DispatchTask> {
        self.state().queue.try_dequeue()
    }

    fn has_tasks(&self) -> bool {
        self.state().queue.has_tasks()
    }

    fn invoke_task(&self, task: DispatchTask) {
        let _access = ThreadAccessGuard::enter(self.state().id);
        invoke_caught(task);
    }

    fn has_thread_access(&self) -> bool {
        ThreadAccessGuard::has_access(self.state().id)
    }

    fn is_serial(&self) -> bool {
        true
    }

    fn shutdown(&self, action: ShutdownAction) {
        let _guard = self.state().lock.lock().unwrap_or_else(|e| e.into_inner());
        self.state().is_shutdown.store(true, Ordering::Release);
        if action == ShutdownAction::CancelRemaining {
            self.state().queue.cancel_remaining();
            self.state().task_count.store(0, Ordering::Release);
            self.pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
        } else {
            self.state().queue.mark_shutdown();
        }
        let outstanding = self.state().handler_ref_count.load(Ordering::Acquire) > 0;
        if !outstanding {
            Inner::signal_terminated(&self.inner);
        }
    }

    fn is_shutdown(&self) -> bool {
        self.state().is_shutdown.load(Ordering::Acquire)
    }

    /// Blocks until a host's pump loop observes shutdown and releases the
    /// last outstanding handler, signaling the termination event above. If
    /// called from inside a task this scheduler is currently running, that
    /// would wait on the very pump loop that's blocked running this call —
    /// so, like the thread pool, it detaches instead: marks itself
    /// terminated immediately rather than waiting for a pump that can't
    /// happen.
    fn await_termination(&self) {
        self.shutdown(ShutdownAction::DrainThenStop);
        if ThreadAccessGuard::has_access(self.state().id) {
            Inner::signal_terminated(&self.inner);
            return;
        }
        let terminated = self
            .state()
            .terminated
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let _ = self
            .state()
            .terminated_cv
            .wait_while(terminated, |t| !*t)
            .unwrap_or_else(|e| e.into_inner());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_run_posted_tasks_in_fifo_order() {
        let scheduler = UiScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            scheduler.post(DispatchTask::new(move || order.lock().unwrap().push(i)));
        }
        scheduler.drain_pending();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn each_post_mints_its_own_handler_and_task_count_tracks_them() {
        let scheduler = UiScheduler::new();
        scheduler.post(DispatchTask::new(|| {}));
        scheduler.post(DispatchTask::new(|| {}));
        assert_eq!(scheduler.task_count(), 2);
        assert_eq!(scheduler.handler_ref_count(), 2);
        let h = scheduler.next_handler().unwrap();
        assert!(h.invoke());
        assert_eq!(scheduler.task_count(), 1);
        assert_eq!(scheduler.handler_ref_count(), 1);
    }

    /// The host invokes one handler and drops the other without running it.
    #[test]
    fn dropping_an_unexecuted_handler_cascades_into_shutdown() {
        let scheduler = UiScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let ran = ran.clone();
            scheduler.post(DispatchTask::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        {
            let ran = ran.clone();
            scheduler.post(DispatchTask::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let first = scheduler.next_handler().unwrap();
        let second = scheduler.next_handler().unwrap();
        assert!(first.invoke());
        drop(second); // host discards without invoking

        assert!(scheduler.is_shutdown());
        assert_eq!(scheduler.task_count(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let terminated = *scheduler
            .state()
            .terminated
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        assert!(terminated, "termination event must be signalled");
    }

    #[test]
    fn late_handler_invoked_after_shutdown_is_a_no_op() {
        let scheduler = UiScheduler::new();
        scheduler.post(DispatchTask::new(|| {}));
        let handler = scheduler.next_handler().unwrap();
        scheduler.shutdown(ShutdownAction::DrainThenStop);
        assert!(!handler.invoke());
    }

    #[test]
    fn handler_ref_count_tracks_outstanding_handlers() {
        let scheduler = UiScheduler::new();
        assert_eq!(scheduler.handler_ref_count(), 0);
        scheduler.post(DispatchTask::new(|| {}));
        scheduler.post(DispatchTask::new(|| {}));
        assert_eq!(scheduler.handler_ref_count(), 2);
        let a = scheduler.next_handler().unwrap();
        let b = scheduler.next_handler().unwrap();
        drop(a);
        assert_eq!(scheduler.handler_ref_count(), 1);
        drop(b);
        assert_eq!(scheduler.handler_ref_count(), 0);
    }

    #[test]
    fn post_after_shutdown_is_silently_dropped() {
        let scheduler = UiScheduler::new();
        scheduler.shutdown(ShutdownAction::DrainThenStop);
        assert!(!scheduler.post(DispatchTask::new(|| {})));
    }

    #[test]
    fn cancel_remaining_clears_pending_handlers_too() {
        let scheduler = UiScheduler::new();
        scheduler.post(DispatchTask::new(|| {}));
        scheduler.post(DispatchTask::new(|| {}));
        scheduler.shutdown(ShutdownAction::CancelRemaining);
        assert!(scheduler.next_handler().is_none());
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn reentrant_await_termination_detaches_instead_of_blocking() {
        let scheduler = Arc::new(UiScheduler::new());
        let inner = scheduler.clone();
        scheduler.post(DispatchTask::new(move || {
            inner.await_termination();
        }));
        scheduler.drain_pending();
        assert!(scheduler.is_shutdown());
    }
}
