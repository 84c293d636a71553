//! `ThreadPoolScheduler`: a condvar-driven pool of worker threads draining
//! one shared [`QueueService`]. A hard cap of 64 concurrent workers, and
//! a `new(0)` constructor call meaning "give me the default size", not
//! "give me zero workers" (see DESIGN.md). Worker count grows on demand
//! rather than being spawned up front: `post` spawns a new worker only
//! when every existing one is already busy and the pool has not yet
//! reached its cap.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

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

/// Hard ceiling on worker count.
pub const MAX_CONCURRENT_THREADS: usize = 64;

/// `busy`/`total` tracked together under one mutex — a worker parking on
/// the condition variable decrements `busy` but not `total`; only a worker
/// that exits (shutdown, no more tasks to pick up) decrements `total`.
struct PoolState {
    busy: usize,
    total: usize,
    workers: Vec<JoinHandle<()>>,
}

/// The scheduler's own backing object: a queue plus the worker-pool
/// bookkeeping, held behind this crate's own [`StrongRef`] rather than a
/// plain `std::sync::Arc` — `ThreadPoolScheduler` is itself a
/// ref-counted object the same way every other object in this crate is,
/// not a bespoke exception that happens to share the same shape.
#[derive(Object)]
struct Shared {
    queue: QueueService,
    gate: Mutex<PoolState>,
    cv: Condvar,
    id: usize,
    max_threads: usize,
}

impl Interface for Shared {}

impl TryFrom<(usize, usize)> for Shared {
    type Error = ConstructError;

    fn try_from((max_threads, id): (usize, usize)) -> Result<Self, ConstructError> {
        Ok(Shared {
            queue: QueueService::new(),
            gate: Mutex::new(PoolState {
                busy: 0,
                total: 0,
                workers: Vec::new(),
            }),
            cv: Condvar::new(),
            id,
            max_threads,
        })
    }
}

pub struct ThreadPoolScheduler {
    shared: StrongRef<Shared>,
}

impl ThreadPoolScheduler {
    /// `num_threads == 0` means "use the default", [`MAX_CONCURRENT_THREADS`]
    /// — not zero workers. Any other value is clamped to that same ceiling.
    /// No worker thread is spawned yet; the pool grows lazily as tasks are
    /// posted.
    pub fn new(num_threads: usize) -> Self {
        let max = if num_threads == 0 {
            MAX_CONCURRENT_THREADS
        } else {
            num_threads.min(MAX_CONCURRENT_THREADS)
        };
        let shared = make::<Shared, _, StrongOnly, DirectConstruct, AbortOnFailure>((
            max,
            scheduler::next_scheduler_id(),
        ));
        ThreadPoolScheduler { shared }
    }

    /// Private accessor to keep every field read as `self.state().x` rather
    /// than repeating `self.shared.get().expect(..)` at each call site —
    /// `shared` is never null once constructed by `new`.
    fn state(&self) -> &Shared {
        self.shared.get().expect("ThreadPoolScheduler::shared is never null")
    }

    /// A pool sized from the host's CPU count, still capped at
    /// [`MAX_CONCURRENT_THREADS`]. Additive convenience on top of the
    /// `thread_pool(0)` default — it does not change what `new(0)` means.
    pub fn recommended_max_threads() -> usize {
        num_cpus::get().min(MAX_CONCURRENT_THREADS)
    }

    pub fn max_threads(&self) -> usize {
        self.state().max_threads
    }

    /// Current number of live worker threads (spawned, not yet exited).
    pub fn thread_count(&self) -> usize {
        self.state().gate.lock().unwrap_or_else(|e| e.into_inner()).total
    }

    /// Number of workers currently draining a task rather than parked.
    pub fn busy_thread_count(&self) -> usize {
        self.state().gate.lock().unwrap_or_else(|e| e.into_inner()).busy
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().queue.is_shutdown()
    }

    /// A freshly spawned worker starts already counted `busy` (its caller
    /// incremented both `busy` and `total` before calling this), so it
    /// goes straight to draining rather than parking first.
    fn spawn_worker(shared: StrongRef<Shared>) -> JoinHandle<()> {
        std::thread::spawn(move || Self::worker_loop(shared))
    }

    /// The worker loop: drain everything ready, then either
    /// pick up more (another task arrived while draining), exit (shutdown
    /// and nothing left), or park on the condition variable.
    fn worker_loop(shared: StrongRef<Shared>) {
        let shared = shared.get().expect("worker's own StrongRef<Shared> is never null");
        loop {
            while let Some(task) = shared.queue.try_dequeue() {
                let _access = ThreadAccessGuard::enter(shared.id);
                invoke_caught(task);
            }

            let mut state = shared.gate.lock().unwrap_or_else(|e| e.into_inner());
            state.busy -= 1;
            if shared.queue.is_shutdown() && !shared.queue.has_tasks() {
                state.total -= 1;
                return;
            }
            if shared.queue.has_tasks() {
                state.busy += 1;
                continue;
            }
            // Bounded wait rather than an unconditional park: a pending
            // delayed task that isn't due yet still counts toward
            // `has_tasks`, so this loop can't simply sleep until woken —
            // the cap bounds how late a due delayed task runs.
            let (mut state, _timeout) = shared
                .cv
                .wait_timeout(state, Duration::from_millis(50))
                .unwrap_or_else(|e| e.into_inner());
            if shared.queue.is_shutdown() && !shared.queue.has_tasks() {
                state.total -= 1;
                return;
            }
            state.busy += 1;
        }
    }
}

impl DispatchQueueService for ThreadPoolScheduler {
    fn post(&self, task: DispatchTask) -> bool {
        if !self.state().queue.post(task) {
            return false;
        }
        let mut state = self.state().gate.lock().unwrap_or_else(|e| e.into_inner());
        if state.busy == state.total && state.total < self.state().max_threads {
            state.busy += 1;
            state.total += 1;
            let handle = Self::spawn_worker(self.shared.clone());
            state.workers.push(handle);
        } else if state.total > state.busy {
            drop(state);
            self.state().cv.notify_one();
        }
        // Otherwise every worker is already busy and the pool is at its
        // cap: the task waits in the queue for whichever worker returns to
        // its drain loop next.
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
        self.state().max_threads == 1
    }

    fn shutdown(&self, action: ShutdownAction) {
        if action == ShutdownAction::CancelRemaining {
            self.state().queue.cancel_remaining();
        }
        self.state().queue.mark_shutdown();
        self.state().cv.notify_all();
    }

    fn is_shutdown(&self) -> bool {
        self.state().queue.is_shutdown()
    }

    fn await_termination(&self) {
        self.shutdown(ShutdownAction::DrainThenStop);
        let workers = std::mem::take(
            &mut self.state().gate.lock().unwrap_or_else(|e| e.into_inner()).workers,
        );
        if ThreadAccessGuard::has_access(self.state().id) {
            // A worker from this same pool is awaiting its own pool's
            // shutdown: joining here would deadlock. Detach instead —
            // spawn a reaper thread that joins the workers once they
            // finish on their own, and return immediately.
            std::thread::spawn(move || {
                for handle in workers {
                    let _ = handle.join();
                }
            });
            return;
        }
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPoolScheduler {
    fn drop(&mut self) {
        if !self.is_shutdown() {
            self.await_termination();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn starts_with_no_workers_and_grows_on_post() {
        let pool = ThreadPoolScheduler::new(4);
        assert_eq!(pool.thread_count(), 0);
        pool.post(DispatchTask::new(|| {}));
        std::thread::sleep(Duration::from_millis(20));
        assert!(pool.thread_count() >= 1);
        pool.shutdown(ShutdownAction::DrainThenStop);
        pool.await_termination();
    }

    #[test]
    fn zero_means_default_cap_not_zero_workers() {
        let pool = ThreadPoolScheduler::new(0);
        assert_eq!(pool.max_threads(), MAX_CONCURRENT_THREADS);
        pool.shutdown(ShutdownAction::DrainThenStop);
        pool.await_termination();
    }

    #[test]
    fn oversized_request_is_clamped() {
        let pool = ThreadPoolScheduler::new(10_000);
        assert_eq!(pool.max_threads(), MAX_CONCURRENT_THREADS);
        pool.shutdown(ShutdownAction::DrainThenStop);
        pool.await_termination();
    }

    #[test]
    fn simple_queue_runs_posted_tasks_in_post_order() {
        let pool = ThreadPoolScheduler::new(1);
        let results = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let results = results.clone();
            pool.post(DispatchTask::new(move || results.lock().unwrap().push(i)));
        }
        pool.shutdown(ShutdownAction::DrainThenStop);
        pool.await_termination();
        assert_eq!(*results.lock().unwrap(), vec![0, 1, 2]);
    }

    /// A pool capped at 4 draining 100 short tasks settles at 4 worker
    /// threads, never 100.
    #[test]
    fn worker_count_settles_at_the_cap_not_at_the_task_count() {
        let pool = ThreadPoolScheduler::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.post(DispatchTask::new(move || {
                std::thread::sleep(Duration::from_millis(10));
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(pool.thread_count() <= 4);
        pool.shutdown(ShutdownAction::DrainThenStop);
        pool.await_termination();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn busy_never_exceeds_total_which_never_exceeds_max() {
        let pool = ThreadPoolScheduler::new(4);
        for _ in 0..40 {
            pool.post(DispatchTask::new(|| {
                std::thread::sleep(Duration::from_millis(5));
            }));
            let state = pool.state().gate.lock().unwrap();
            assert!(state.busy <= state.total);
            assert!(state.total <= pool.max_threads());
        }
        pool.shutdown(ShutdownAction::DrainThenStop);
        pool.await_termination();
    }

    #[test]
    fn post_after_shutdown_is_silently_dropped() {
        let pool = ThreadPoolScheduler::new(2);
        pool.shutdown(ShutdownAction::DrainThenStop);
        let accepted = pool.post(DispatchTask::new(|| {}));
        assert!(!accepted);
        pool.await_termination();
    }

    #[test]
    fn cancel_remaining_drops_unstarted_tasks() {
        let pool = ThreadPoolScheduler::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        // Block the single worker so the rest pile up in the queue.
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        pool.post(DispatchTask::new(move || {
            let _ = rx.recv();
        }));
        for _ in 0..5 {
            let ran = ran.clone();
            pool.post(DispatchTask::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.shutdown(ShutdownAction::CancelRemaining);
        let _ = tx.send(());
        pool.await_termination();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reentrant_await_termination_does_not_deadlock() {
        let pool = Arc::new(ThreadPoolScheduler::new(1));
        let inner = pool.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        pool.post(DispatchTask::new(move || {
            inner.shutdown(ShutdownAction::DrainThenStop);
            inner.await_termination();
            let _ = tx.send(());
        }));
        rx.recv_timeout(Duration::from_secs(5))
            .expect("await_termination from inside a worker must not deadlock");
    }
}
