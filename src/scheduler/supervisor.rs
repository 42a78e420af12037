//! Worker Supervision
//!
//! Each pool slot runs under a supervisor loop. When the worker unit crashes
//! the supervisor reports the in-flight task, then either starts a fresh
//! worker on the same inbox or, once the slot has crashed too often inside
//! the rolling window, retires the slot and hands its backlog back to the
//! scheduler.

use super::manager::SchedulerCommand;
use super::registry::TaskHandlerRegistry;
use super::types::Task;
use super::worker::{Worker, WorkerEvent};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// Bound on restarts per slot inside a rolling time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub within: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 10,
            within: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Bring up a fresh worker. Carries the number of restarts in the window.
    Restart(u32),
    /// Budget exhausted; the slot must be retired.
    Escalate,
}

/// Sliding-window crash counter for one slot.
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    crashes: VecDeque<Instant>,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            crashes: VecDeque::new(),
        }
    }

    /// Records a crash at `now` and decides what happens to the slot.
    pub fn record(&mut self, now: Instant) -> RestartDecision {
        while let Some(oldest) = self.crashes.front() {
            if now.duration_since(*oldest) >= self.policy.within {
                self.crashes.pop_front();
            } else {
                break;
            }
        }

        self.crashes.push_back(now);
        let in_window = self.crashes.len() as u32;

        if in_window > self.policy.max_restarts {
            RestartDecision::Escalate
        } else {
            RestartDecision::Restart(in_window)
        }
    }
}

/// Runs one slot until its inbox closes or its restart budget runs out.
pub(crate) async fn supervise(
    slot: usize,
    handlers: Arc<TaskHandlerRegistry>,
    mut inbox: UnboundedReceiver<Task>,
    scheduler: UnboundedSender<SchedulerCommand>,
    policy: RestartPolicy,
) {
    let mut tracker = RestartTracker::new(policy);

    loop {
        let worker = Worker::new(slot, handlers.clone());
        tracing::debug!("Supervisor bringing up worker {}", worker.slot());

        let fault = match worker.run(&mut inbox, &scheduler).await {
            Ok(()) => {
                tracing::info!("Worker {} stopped", slot);
                return;
            }
            Err(fault) => fault,
        };

        tracing::error!("Worker {} crashed: {}", slot, fault);
        report(
            &scheduler,
            WorkerEvent::Crashed {
                slot,
                task: fault.task,
                detail: fault.detail,
            },
        );

        match tracker.record(Instant::now()) {
            RestartDecision::Restart(restarts) => {
                tracing::warn!(
                    "Restarting worker {} ({}/{} restarts within {:?})",
                    slot,
                    restarts,
                    policy.max_restarts,
                    policy.within
                );
                report(&scheduler, WorkerEvent::Restarted { slot, restarts });
            }
            RestartDecision::Escalate => {
                tracing::error!(
                    "Worker {} exceeded {} restarts within {:?}, retiring slot",
                    slot,
                    policy.max_restarts,
                    policy.within
                );

                inbox.close();
                let mut orphans = Vec::new();
                while let Ok(task) = inbox.try_recv() {
                    orphans.push(task);
                }

                report(&scheduler, WorkerEvent::Retired { slot, orphans });
                return;
            }
        }
    }
}

fn report(scheduler: &UnboundedSender<SchedulerCommand>, event: WorkerEvent) {
    if scheduler.send(SchedulerCommand::Worker(event)).is_err() {
        tracing::debug!("Supervisor: scheduler stopped, dropping report");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_restarts: u32, secs: u64) -> RestartPolicy {
        RestartPolicy {
            max_restarts,
            within: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_escalates_after_budget() {
        let mut tracker = RestartTracker::new(policy(2, 60));
        let now = Instant::now();

        assert_eq!(tracker.record(now), RestartDecision::Restart(1));
        assert_eq!(tracker.record(now), RestartDecision::Restart(2));
        assert_eq!(tracker.record(now), RestartDecision::Escalate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_window_slides() {
        let mut tracker = RestartTracker::new(policy(1, 10));
        let start = Instant::now();

        assert_eq!(tracker.record(start), RestartDecision::Restart(1));
        // Outside the window the old crash no longer counts.
        let later = start + Duration::from_secs(11);
        assert_eq!(tracker.record(later), RestartDecision::Restart(1));
        assert_eq!(
            tracker.record(later + Duration::from_secs(1)),
            RestartDecision::Escalate
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_escalates_immediately() {
        let mut tracker = RestartTracker::new(policy(0, 60));
        assert_eq!(tracker.record(Instant::now()), RestartDecision::Escalate);
    }
}
