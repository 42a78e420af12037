//! Built-in task kinds.
//!
//! Each kind simulates bounded work with a base delay plus random jitter and
//! returns a deterministic message echoing the payload. None of them fail;
//! failing behaviour is injected by registering a different handler.

use super::registry::TaskHandlerRegistry;
use super::types::Task;

use std::sync::Arc;
use std::time::Duration;

pub const DATA_PROCESSING: &str = "DATA_PROCESSING";
pub const FILE_OPERATION: &str = "FILE_OPERATION";
pub const API_CALL: &str = "API_CALL";
pub const NOTIFICATION: &str = "NOTIFICATION";
pub const REPORT_GENERATION: &str = "REPORT_GENERATION";

/// The five kinds advertised to callers, in display order.
pub const KNOWN_KINDS: [&str; 5] = [
    DATA_PROCESSING,
    FILE_OPERATION,
    API_CALL,
    NOTIFICATION,
    REPORT_GENERATION,
];

/// Simulated latency: `base_ms` plus up to `jitter_ms` extra.
#[derive(Debug, Clone, Copy)]
struct Latency {
    base_ms: u64,
    jitter_ms: u64,
}

impl Latency {
    const fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self { base_ms, jitter_ms }
    }

    fn sample(&self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % self.jitter_ms
        };
        Duration::from_millis(self.base_ms + jitter)
    }
}

fn latency_for(kind: &str) -> Latency {
    match kind {
        DATA_PROCESSING => Latency::new(1000, 2000),
        FILE_OPERATION => Latency::new(1500, 1500),
        API_CALL => Latency::new(500, 1000),
        NOTIFICATION => Latency::new(300, 500),
        REPORT_GENERATION => Latency::new(2000, 3000),
        _ => Latency::new(1000, 0),
    }
}

fn success_message(task: &Task) -> String {
    match task.kind.as_str() {
        DATA_PROCESSING => format!("Data processed: {}", task.payload),
        FILE_OPERATION => format!("File operation completed: {}", task.payload),
        API_CALL => format!("API call successful: {}", task.payload),
        NOTIFICATION => format!("Notification sent: {}", task.payload),
        REPORT_GENERATION => format!("Report generated: {}", task.payload),
        _ => format!("Task processed: {}", task.name),
    }
}

async fn simulate(task: Task) -> anyhow::Result<String> {
    let delay = latency_for(&task.kind).sample();
    tracing::info!(
        "Processing {} task '{}' ({} ms)",
        task.kind,
        task.name,
        delay.as_millis()
    );
    tokio::time::sleep(delay).await;
    Ok(success_message(&task))
}

/// Registry with the five built-in kinds and the default fallback.
pub fn builtin_registry() -> Arc<TaskHandlerRegistry> {
    let registry = TaskHandlerRegistry::with_fallback(simulate);
    for kind in KNOWN_KINDS {
        registry.register(kind, simulate);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_messages_echo_payload_or_name() {
        let mut task = Task::new("Nightly", API_CALL, "GET /health", None);
        assert_eq!(success_message(&task), "API call successful: GET /health");

        task.kind = "SOMETHING_ELSE".to_string();
        assert_eq!(success_message(&task), "Task processed: Nightly");
    }

    #[test]
    fn test_latency_stays_inside_window() {
        for _ in 0..50 {
            let delay = latency_for(NOTIFICATION).sample();
            assert!(delay >= Duration::from_millis(300));
            assert!(delay < Duration::from_millis(800));
        }
        assert_eq!(latency_for("UNKNOWN").sample(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_builtin_registry_covers_known_kinds() {
        let registry = builtin_registry();
        assert_eq!(registry.handler_count(), KNOWN_KINDS.len());

        let task = Task::new("Monthly", REPORT_GENERATION, "Q3", None);
        let message = registry.execute(&task).await.unwrap();
        assert_eq!(message, "Report generated: Q3");

        let unknown = Task::new("Odd one", "DEFAULT", "", None);
        let message = registry.execute(&unknown).await.unwrap();
        assert_eq!(message, "Task processed: Odd one");
    }
}
