//! `QueueService`: the FIFO-plus-deadline task store shared by
//! [`crate::dispatch::ThreadPoolScheduler`] and
//! [`crate::dispatch::UiScheduler`]. Immediate tasks run in
//! post order; delayed tasks run in earliest-deadline order once their
//! deadline has passed, ahead of any immediate task that arrived later —
//! mirroring a classic "timer wheel plus work queue" split rather than a
//! single merged priority list, since true real-time ordering across both
//! kinds only matters once a deadline is actually due.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::dispatch::task::DispatchTask;

pub(crate) struct QueueService {
    fifo: Mutex<VecDeque<DispatchTask>>,
    delayed: Mutex<BinaryHeap<Reverse<DispatchTask>>>,
    sequence: AtomicU64,
    task_count: AtomicUsize,
    shutdown: AtomicBool,
}

impl QueueService {
    pub(crate) fn new() -> Self {
        QueueService {
            fifo: Mutex::new(VecDeque::new()),
            delayed: Mutex::new(BinaryHeap::new()),
            sequence: AtomicU64::new(0),
            task_count: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn mark_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Posts `task`, returning `false` without queuing it if the queue is
    /// already shut down: post-after-shutdown silently drops rather than
    /// panicking or aborting.
    pub(crate) fn post(&self, mut task: DispatchTask) -> bool {
        if self.is_shutdown() {
            return false;
        }
        task.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        if task.is_delayed() {
            self.delayed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Reverse(task));
        } else {
            self.fifo
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(task);
        }
        self.task_count.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub(crate) fn has_tasks(&self) -> bool {
        self.task_count.load(Ordering::Acquire) > 0
    }

    /// Discards every task not yet dequeued, for `ShutdownAction::CancelRemaining`:
    /// tasks are dropped silently under cancel-remaining. A task whose
    /// dequeue has already begun (handed to a worker) is unaffected — it
    /// runs to completion; no task posted before shutdown whose dequeue
    /// has not begun is ever invoked.
    pub(crate) fn cancel_remaining(&self) {
        self.fifo.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.delayed.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.task_count.store(0, Ordering::Release);
    }

    /// Pops the next runnable task, if any: a due delayed task takes
    /// priority over the FIFO queue, since it's already overdue.
    pub(crate) fn try_dequeue(&self) -> Option<DispatchTask> {
        {
            let mut delayed = self.delayed.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(Reverse(top)) = delayed.peek() {
                if top.deadline.unwrap() <= Instant::now() {
                    let task = delayed.pop().unwrap().0;
                    drop(delayed);
                    self.task_count.fetch_sub(1, Ordering::AcqRel);
                    return Some(task);
                }
            }
        }
        let mut fifo = self.fifo.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = fifo.pop_front() {
            drop(fifo);
            self.task_count.fetch_sub(1, Ordering::AcqRel);
            return Some(task);
        }
        None
    }
}
