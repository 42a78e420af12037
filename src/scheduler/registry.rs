//! Task Handler Registry
//!
//! A dynamic registry that maps task kinds (e.g., "DATA_PROCESSING") to
//! executable async closures. Kinds without a registered handler run the
//! fallback handler instead of failing, so the worker never has to branch on
//! the kind string itself.

use super::types::*;

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a thread-safe, asynchronous task handler function.
/// It takes a copy of the `Task` and resolves to the success message.
pub type TaskHandlerFn =
    Arc<dyn Fn(Task) -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// Registry holding the mapping between task kinds and their implementation.
pub struct TaskHandlerRegistry {
    handlers: DashMap<String, TaskHandlerFn>,
    fallback: TaskHandlerFn,
}

impl TaskHandlerRegistry {
    /// Creates an empty registry whose fallback echoes the task name.
    pub fn new() -> Arc<Self> {
        Self::with_fallback(|task: Task| async move { Ok(format!("Task processed: {}", task.name)) })
    }

    /// Creates an empty registry with a custom fallback for unknown kinds.
    pub fn with_fallback<F, Fut>(fallback: F) -> Arc<Self>
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Arc::new(Self {
            handlers: DashMap::new(),
            fallback: erase(fallback),
        })
    }

    /// Registers a handler under a kind. A second registration for the same
    /// kind replaces the first.
    ///
    /// # Arguments
    /// * `kind` - The kind string carried by tasks (e.g., "API_CALL").
    /// * `handler` - The closure/function that implements the task logic.
    pub fn register<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.handlers.insert(kind.to_string(), erase(handler));

        tracing::info!("Registered task handler: {}", kind);
    }

    /// Looks up the handler for `task.kind` (or the fallback) and runs it.
    ///
    /// # Returns
    /// * `Ok(message)` if the handler executed successfully.
    /// * `Err` if the handler reported a task-level failure.
    pub async fn execute(&self, task: &Task) -> Result<String> {
        let handler = match self.handlers.get(&task.kind) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::debug!("No handler for kind '{}', using fallback", task.kind);
                self.fallback.clone()
            }
        };

        tracing::debug!(
            "Executing task {} with kind '{}' (payload size: {} bytes)",
            task.id,
            task.kind,
            task.payload.len()
        );

        // The map guard is released before awaiting the handler.
        handler(task.clone()).await
    }

    /// Returns all registered kinds, sorted.
    pub fn list_handlers(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        kinds.sort();
        kinds
    }

    /// Checks if a handler is registered for a kind.
    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Returns the total number of registered handlers (fallback excluded).
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

// Box::pin type-erases the concrete Future so different async functions can
// live in the same map.
fn erase<F, Fut>(handler: F) -> TaskHandlerFn
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    Arc::new(move |task: Task| {
        Box::pin(handler(task)) as Pin<Box<dyn Future<Output = Result<String>> + Send>>
    })
}
