//! The dispatch-queue runtime: a common [`DispatchQueueService`] surface
//! implemented by two schedulers with very different execution models —
//! a worker-thread pool and a host-pumped single-threaded queue.

mod queue;
mod scheduler;
mod task;
mod thread_pool;
mod ui;

pub use scheduler::{DispatchQueueService, ShutdownAction};
pub use task::DispatchTask;
pub use thread_pool::{ThreadPoolScheduler, MAX_CONCURRENT_THREADS};
pub use ui::{UiHandler, UiScheduler};
