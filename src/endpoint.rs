//! Requester and compute-node views of the job-state store.
//!
//! Each endpoint is bound to one [`Actor`] and only talks to the store
//! through version-checked updates carrying the version of the caller's
//! working copy. Delivery is at-least-once, so a conflict whose re-read
//! shows this exact event (same target state and payload) already landed
//! is reported as [`Delivery::Duplicate`]. A different actor's write to the
//! same state stays a conflict.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::store::{JobStore, UpdateRequest};
use crate::state_machine::{
    Actor, ExecutionEvent, ExecutionId, ExecutionState, JobExecutions, RunCommandResult,
    StorageSpec, VerificationResult,
};

/// Outcome of delivering a transition to the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The transition was applied by this call.
    Applied(ExecutionState),
    /// An earlier delivery of the same transition had already been applied.
    Duplicate(ExecutionState),
}

impl Delivery {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Delivery::Duplicate(_))
    }

    /// The authoritative record after delivery.
    pub fn into_inner(self) -> ExecutionState {
        match self {
            Delivery::Applied(execution) | Delivery::Duplicate(execution) => execution,
        }
    }
}

#[derive(Debug)]
struct Channel<S> {
    store: Arc<S>,
    actor: Actor,
}

impl<S: JobStore> Channel<S> {
    async fn deliver(&self, copy: &ExecutionState, event: ExecutionEvent) -> Result<Delivery> {
        let id = copy.id();
        let expected = event.clone();
        let request = UpdateRequest::new(id.clone(), copy.version, self.actor, event);

        match self.store.update_execution(request).await {
            Ok(updated) => Ok(Delivery::Applied(updated)),
            Err(err) if err.is_conflict() => {
                let current = self.store.get_execution(&id).await?;
                if current.version == copy.version + 1 && current.reflects(&expected) {
                    info!(execution = %id, state = %current.state, actor = %self.actor, "duplicate delivery");
                    Ok(Delivery::Duplicate(current))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }
}

/// The requester's side: creates executions and drives bidding, verification
/// feedback, publication and cancellation.
#[derive(Debug)]
pub struct RequesterEndpoint<S> {
    channel: Channel<S>,
}

impl<S: JobStore> RequesterEndpoint<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            channel: Channel {
                store,
                actor: Actor::Requester,
            },
        }
    }

    /// Open a fresh attempt for `node_id`. Fails if the node already has a
    /// live execution for this job.
    pub async fn create_execution(&self, job_id: &str, node_id: &str) -> Result<ExecutionState> {
        let id = ExecutionId::generate(job_id, node_id);
        self.channel
            .store
            .create_execution(ExecutionState::from_id(&id))
            .await
    }

    pub async fn execution(&self, id: &ExecutionId) -> Result<ExecutionState> {
        self.channel.store.get_execution(id).await
    }

    pub async fn job(&self, job_id: &str) -> Result<JobExecutions> {
        self.channel.store.get_job(job_id).await
    }

    pub async fn ask_for_bid(&self, copy: &ExecutionState) -> Result<Delivery> {
        self.channel.deliver(copy, ExecutionEvent::AskForBid).await
    }

    pub async fn accept_bid(&self, copy: &ExecutionState) -> Result<Delivery> {
        self.channel.deliver(copy, ExecutionEvent::AcceptBid).await
    }

    pub async fn reject_bid(&self, copy: &ExecutionState, reason: &str) -> Result<Delivery> {
        let event = ExecutionEvent::RejectBid {
            reason: reason.to_string(),
        };
        self.channel.deliver(copy, event).await
    }

    /// Record the verifier's verdict on a proposed result.
    pub async fn verify(
        &self,
        copy: &ExecutionState,
        result: VerificationResult,
    ) -> Result<Delivery> {
        self.channel
            .deliver(copy, ExecutionEvent::Verify(result))
            .await
    }

    /// Record where the accepted result was published.
    pub async fn complete(&self, copy: &ExecutionState, published: StorageSpec) -> Result<Delivery> {
        self.channel
            .deliver(copy, ExecutionEvent::Complete { published })
            .await
    }

    pub async fn cancel(&self, copy: &ExecutionState, reason: &str) -> Result<Delivery> {
        let event = ExecutionEvent::Cancel {
            reason: reason.to_string(),
        };
        self.channel.deliver(copy, event).await
    }

    pub async fn fail(&self, copy: &ExecutionState, reason: &str) -> Result<Delivery> {
        let event = ExecutionEvent::Fail {
            reason: reason.to_string(),
        };
        self.channel.deliver(copy, event).await
    }
}

/// The compute node's side: answers asks for bid and reports results.
#[derive(Debug)]
pub struct ComputeNodeEndpoint<S> {
    channel: Channel<S>,
}

impl<S: JobStore> ComputeNodeEndpoint<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            channel: Channel {
                store,
                actor: Actor::ComputeNode,
            },
        }
    }

    pub async fn execution(&self, id: &ExecutionId) -> Result<ExecutionState> {
        self.channel.store.get_execution(id).await
    }

    pub async fn accept_ask_for_bid(&self, copy: &ExecutionState) -> Result<Delivery> {
        self.channel
            .deliver(copy, ExecutionEvent::AcceptAskForBid)
            .await
    }

    pub async fn reject_ask_for_bid(&self, copy: &ExecutionState, reason: &str) -> Result<Delivery> {
        let event = ExecutionEvent::RejectAskForBid {
            reason: reason.to_string(),
        };
        self.channel.deliver(copy, event).await
    }

    pub async fn propose_result(
        &self,
        copy: &ExecutionState,
        proposal: Vec<u8>,
        run_output: Option<RunCommandResult>,
    ) -> Result<Delivery> {
        let event = ExecutionEvent::ProposeResult {
            proposal,
            run_output,
        };
        self.channel.deliver(copy, event).await
    }

    pub async fn fail(&self, copy: &ExecutionState, reason: &str) -> Result<Delivery> {
        let event = ExecutionEvent::Fail {
            reason: reason.to_string(),
        };
        self.channel.deliver(copy, event).await
    }
}
