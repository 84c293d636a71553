//! `DispatchTask`: a unit of work posted to a dispatch queue. A plain
//! boxed closure plus an optional deadline, ordered the way
//! `queue::QueueService` needs: immediate tasks run FIFO, deadline tasks
//! run earliest-deadline-first once due.

use std::time::Instant;

pub(crate) type TaskFn = Box<dyn FnOnce() + Send + 'static>;

pub struct DispatchTask {
    pub(crate) run: TaskFn,
    pub(crate) deadline: Option<Instant>,
    pub(crate) sequence: u64,
}

impl DispatchTask {
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        DispatchTask {
            run: Box::new(f),
            deadline: None,
            sequence: 0,
        }
    }

    pub fn after<F: FnOnce() + Send + 'static>(deadline: Instant, f: F) -> Self {
        DispatchTask {
            run: Box::new(f),
            deadline: Some(deadline),
            sequence: 0,
        }
    }

    pub fn is_delayed(&self) -> bool {
        self.deadline.is_some()
    }
}

impl std::fmt::Debug for DispatchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTask")
            .field("deadline", &self.deadline)
            .field("sequence", &self.sequence)
            .finish()
    }
}

// Ordered by deadline for the delayed min-heap (queue.rs), ties broken by
// arrival order so same-deadline tasks still run FIFO among themselves.
impl PartialEq for DispatchTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}
impl Eq for DispatchTask {}

impl PartialOrd for DispatchTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DispatchTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => a.cmp(&b).then(self.sequence.cmp(&other.sequence)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => self.sequence.cmp(&other.sequence),
        }
    }
}
