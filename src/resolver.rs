//! Polling reads of a job's execution set until a condition holds.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::{ExecutionError, Result};
use crate::state_machine::{ExecutionStateType, JobExecutions};
use crate::store::JobStore;

/// Backoff schedule for polling the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay before the first re-read.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Give up after this long.
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            max_delay_ms: 1000,
            timeout_ms: 30_000,
        }
    }
}

impl PollConfig {
    /// delay = min(base_delay_ms * 2^(attempt - 1), max_delay_ms)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

/// What a caller is waiting to observe on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// Every execution has reached a terminal state.
    AllTerminal,
    /// At least `n` executions are in the given state.
    StateCountAtLeast(ExecutionStateType, usize),
}

impl WaitCondition {
    pub fn is_met(&self, job: &JobExecutions) -> bool {
        match *self {
            WaitCondition::AllTerminal => job.all_terminal(),
            WaitCondition::StateCountAtLeast(state, n) => {
                job.count_by_state().get(&state).copied().unwrap_or(0) >= n
            }
        }
    }
}

pub struct JobStateResolver<S> {
    store: Arc<S>,
    poll: PollConfig,
}

impl<S: JobStore> JobStateResolver<S> {
    pub fn new(store: Arc<S>, poll: PollConfig) -> Self {
        Self { store, poll }
    }

    /// Re-read `job_id` until `condition` holds, returning the satisfying
    /// snapshot. A job that does not exist yet is waited for like any other.
    pub async fn wait(&self, job_id: &str, condition: WaitCondition) -> Result<JobExecutions> {
        let started = Instant::now();
        let timeout = Duration::from_millis(self.poll.timeout_ms);
        let mut attempt = 0;

        loop {
            match self.store.get_job(job_id).await {
                Ok(job) if condition.is_met(&job) => return Ok(job),
                Ok(_) | Err(ExecutionError::JobNotFound(_)) => {}
                Err(err) => return Err(err),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ExecutionError::Timeout {
                    job_id: job_id.to_string(),
                    waited_ms: elapsed.as_millis() as u64,
                });
            }

            attempt += 1;
            let delay = Duration::from_millis(self.poll.delay_for_attempt(attempt))
                .min(timeout - elapsed);
            debug!(job_id, ?condition, attempt, delay_ms = delay.as_millis() as u64, "waiting on job");
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{ComputeNodeEndpoint, RequesterEndpoint};
    use crate::store::InMemoryJobStore;

    fn fast_poll(timeout_ms: u64) -> PollConfig {
        PollConfig {
            base_delay_ms: 5,
            max_delay_ms: 20,
            timeout_ms,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let poll = PollConfig {
            base_delay_ms: 100,
            max_delay_ms: 500,
            timeout_ms: 0,
        };
        assert_eq!(poll.delay_for_attempt(1), 100);
        assert_eq!(poll.delay_for_attempt(2), 200);
        assert_eq!(poll.delay_for_attempt(3), 400);
        assert_eq!(poll.delay_for_attempt(4), 500);
        assert_eq!(poll.delay_for_attempt(64), 500);
    }

    #[tokio::test]
    async fn wait_returns_once_all_terminal() {
        let store = Arc::new(InMemoryJobStore::new());
        let requester = RequesterEndpoint::new(Arc::clone(&store));
        let node = ComputeNodeEndpoint::new(Arc::clone(&store));
        let resolver = JobStateResolver::new(Arc::clone(&store), fast_poll(5_000));

        let copy = requester.create_execution("job-1", "node-a").await.unwrap();
        let copy = requester.ask_for_bid(&copy).await.unwrap().into_inner();

        let waiter = tokio::spawn(async move {
            resolver.wait("job-1", WaitCondition::AllTerminal).await
        });
        node.reject_ask_for_bid(&copy, "busy").await.unwrap();

        let job = waiter.await.unwrap().unwrap();
        assert!(job.all_terminal());
        assert_eq!(
            job.count_by_state()[&ExecutionStateType::AskForBidRejected],
            1
        );
    }

    #[tokio::test]
    async fn wait_tolerates_a_job_created_later() {
        let store = Arc::new(InMemoryJobStore::new());
        let requester = RequesterEndpoint::new(Arc::clone(&store));
        let resolver = JobStateResolver::new(Arc::clone(&store), fast_poll(5_000));

        let waiter = tokio::spawn(async move {
            resolver
                .wait("job-late", WaitCondition::StateCountAtLeast(ExecutionStateType::New, 2))
                .await
        });
        requester.create_execution("job-late", "n1").await.unwrap();
        requester.create_execution("job-late", "n2").await.unwrap();

        let job = waiter.await.unwrap().unwrap();
        assert_eq!(job.len(), 2);
    }

    #[tokio::test]
    async fn wait_times_out() {
        let store = Arc::new(InMemoryJobStore::new());
        let resolver = JobStateResolver::new(store, fast_poll(30));
        let err = resolver
            .wait("missing", WaitCondition::AllTerminal)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { ref job_id, .. } if job_id == "missing"));
    }
}
