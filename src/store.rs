//! Authoritative job-state storage.
//!
//! [`JobStore`] is the seam to durable storage: a keyed map of job id to
//! [`JobExecutions`] whose only mutation path is a compare-and-swap on a
//! single execution. [`InMemoryJobStore`] backs it with a map behind a
//! `tokio` lock.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ExecutionError, Result};
use crate::state_machine::{Actor, ExecutionEvent, ExecutionId, ExecutionState, JobExecutions};

/// A version-checked state change for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub id: ExecutionId,
    pub expected_version: u64,
    pub actor: Actor,
    pub event: ExecutionEvent,
}

impl UpdateRequest {
    pub fn new(id: ExecutionId, expected_version: u64, actor: Actor, event: ExecutionEvent) -> Self {
        Self {
            id,
            expected_version,
            actor,
            event,
        }
    }
}

/// Durable storage of job execution sets.
pub trait JobStore: Send + Sync {
    /// Register a fresh `New` execution, creating the job's set on first use.
    /// Records that already carry progress are refused.
    fn create_execution(
        &self,
        execution: ExecutionState,
    ) -> impl Future<Output = Result<ExecutionState>> + Send;

    fn get_job(&self, job_id: &str) -> impl Future<Output = Result<JobExecutions>> + Send;

    fn get_execution(&self, id: &ExecutionId)
    -> impl Future<Output = Result<ExecutionState>> + Send;

    /// Atomically apply `request` if `expected_version` is still current.
    fn update_execution(
        &self,
        request: UpdateRequest,
    ) -> impl Future<Output = Result<ExecutionState>> + Send;
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobExecutions>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    async fn create_execution(&self, execution: ExecutionState) -> Result<ExecutionState> {
        let mut jobs = self.jobs.write().await;
        let set = jobs
            .entry(execution.job_id.clone())
            .or_insert_with(|| JobExecutions::new(&execution.job_id));

        if let Err(err) = set.create(execution.clone()) {
            if set.is_empty() {
                jobs.remove(&execution.job_id);
            }
            warn!(execution = %execution, error = %err, "rejected new execution");
            return Err(err);
        }

        info!(execution = %execution, state = %execution.state, "created execution");
        Ok(execution)
    }

    async fn get_job(&self, job_id: &str) -> Result<JobExecutions> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| ExecutionError::JobNotFound(job_id.to_string()))
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<ExecutionState> {
        let jobs = self.jobs.read().await;
        jobs.get(&id.job_id)
            .and_then(|set| set.get(id))
            .cloned()
            .ok_or_else(|| ExecutionError::ExecutionNotFound(id.clone()))
    }

    async fn update_execution(&self, request: UpdateRequest) -> Result<ExecutionState> {
        let UpdateRequest {
            id,
            expected_version,
            actor,
            event,
        } = request;
        let kind = event.kind();

        let mut jobs = self.jobs.write().await;
        let set = jobs
            .get_mut(&id.job_id)
            .ok_or_else(|| ExecutionError::ExecutionNotFound(id.clone()))?;

        match set.apply(&id, actor, expected_version, event) {
            Ok(updated) => {
                debug!(
                    execution = %id,
                    %actor,
                    event = %kind,
                    state = %updated.state,
                    version = updated.version,
                    "applied transition"
                );
                Ok(updated.clone())
            }
            Err(err) => {
                warn!(execution = %id, %actor, event = %kind, error = %err, "rejected transition");
                Err(err)
            }
        }
    }
}
