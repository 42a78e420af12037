//! In-Process Task Scheduler
//!
//! Accepts prioritised tasks, dispatches them round-robin over a fixed pool
//! of supervised workers, retries failed attempts and answers status queries.
//!
//! ## Architecture Overview
//! The scheduler follows a **single-writer actor** model:
//! 1. **Submission**: callers send commands to the `Scheduler` handle. One
//!    tokio task owns every piece of scheduling state and applies commands in
//!    arrival order.
//! 2. **Dispatch**: each task goes straight to the next worker slot in
//!    round-robin order. A slot's inbox is FIFO and absorbs back-to-back
//!    assignments.
//! 3. **Execution**: workers look the task kind up in the handler registry,
//!    run it and report the task back as `Completed` or `Failed`.
//! 4. **Retry**: failed attempts with budget left go to the priority pending
//!    queue, which is drained one task per finished attempt.
//! 5. **Supervision**: a worker unit that panics is restarted in place until
//!    it exceeds its restart budget, after which the slot is retired.
//!
//! ## Submodules
//! - **`types`**: task entity, priorities, statuses and reply shapes.
//! - **`queue`**: max-priority pending queue, FIFO among equals.
//! - **`registry`** / **`kinds`**: kind-to-handler map and the built-in kinds.
//! - **`worker`** / **`supervisor`**: execution units and their restart loop.
//! - **`manager`**: the scheduler loop and its public handle.
//! - **`notify`**: lifecycle events for external listeners.
//! - **`service`**, **`protocol`**, **`handlers`**: the client-facing facade
//!   and its HTTP binding.

pub mod types;
pub mod queue;
pub mod registry;
pub mod kinds;
pub mod worker;
pub mod supervisor;
pub mod manager;
pub mod notify;
pub mod protocol;
pub mod service;
pub mod handlers;

pub use manager::Scheduler;
pub use notify::{BroadcastSink, NotificationSink, TaskEvent, TaskEventKind};
pub use registry::TaskHandlerRegistry;
pub use service::TaskService;
pub use types::{Task, TaskId, TaskPriority, TaskStatus};
