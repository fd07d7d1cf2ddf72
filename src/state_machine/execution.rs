use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::ExecutionStateType;
use super::transition::{Actor, ExecutionEvent, rule_for};
use crate::error::ExecutionError;

/// Number of leading characters of a node id shown in log-friendly renderings.
pub const SHORT_ID_LENGTH: usize = 8;

/// Truncate an id for display, respecting char boundaries.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LENGTH) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Globally unique name of one execution attempt.
///
/// No validation happens here; this is a plain value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId {
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(rename = "ExecutionID")]
    pub execution_id: String,
}

impl ExecutionId {
    pub fn new(
        job_id: impl Into<String>,
        node_id: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            node_id: node_id.into(),
            execution_id: execution_id.into(),
        }
    }

    /// A new attempt reference for `node_id` on `job_id`.
    pub fn generate(job_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::new(job_id, node_id, Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.job_id,
            short_id(&self.node_id),
            self.execution_id
        )
    }
}

/// Verifier verdict on a proposed result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VerificationResult {
    /// Verification has run to completion.
    pub complete: bool,
    /// The proposal was judged correct.
    pub result: bool,
}

/// Captured output of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunCommandResult {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stdout_truncated: bool,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub stderr_truncated: bool,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

/// Reference to durably stored output. Only the reference is tracked here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageSpec {
    #[serde(default)]
    pub storage_source: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "CID")]
    pub cid: String,
    #[serde(default, rename = "URL")]
    pub url: String,
}

/// Mutable record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "NodeId")]
    pub node_id: String,
    /// Node-local handle; forms the attempt part of the [`ExecutionId`].
    #[serde(rename = "ComputeReference")]
    pub compute_reference: String,
    #[serde(rename = "State")]
    pub state: ExecutionStateType,
    /// The node accepted the ask for bid and intends to run the job.
    #[serde(rename = "AcceptedAskForBid")]
    pub accepted_ask_for_bid: bool,
    /// Free-text diagnostic. Never drives control flow.
    #[serde(rename = "Status", default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(
        rename = "VerificationProposal",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub verification_proposal: Vec<u8>,
    #[serde(rename = "VerificationResult", default)]
    pub verification_result: VerificationResult,
    #[serde(
        rename = "PublishedResults",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub published_result: Option<StorageSpec>,
    #[serde(rename = "RunOutput", default, skip_serializing_if = "Option::is_none")]
    pub run_output: Option<RunCommandResult>,
    /// Incremented on every accepted mutation.
    #[serde(rename = "Version")]
    pub version: u64,
    #[serde(rename = "CreateTime")]
    pub create_time: DateTime<Utc>,
    #[serde(rename = "UpdateTime")]
    pub update_time: DateTime<Utc>,
}

impl ExecutionState {
    /// Create a record in the `New` state at version 1.
    ///
    /// # Panics
    ///
    /// Panics if `job_id` or `node_id` is empty.
    pub fn new(
        job_id: impl Into<String>,
        node_id: impl Into<String>,
        compute_reference: impl Into<String>,
    ) -> Self {
        let job_id = job_id.into();
        let node_id = node_id.into();
        assert!(!job_id.is_empty(), "execution requires a job id");
        assert!(!node_id.is_empty(), "execution requires a node id");

        let now = Utc::now();
        Self {
            job_id,
            node_id,
            compute_reference: compute_reference.into(),
            state: ExecutionStateType::New,
            accepted_ask_for_bid: false,
            status: String::new(),
            verification_proposal: Vec::new(),
            verification_result: VerificationResult::default(),
            published_result: None,
            run_output: None,
            version: 1,
            create_time: now,
            update_time: now,
        }
    }

    pub fn from_id(id: &ExecutionId) -> Self {
        Self::new(&id.job_id, &id.node_id, &id.execution_id)
    }

    pub fn id(&self) -> ExecutionId {
        ExecutionId::new(&self.job_id, &self.node_id, &self.compute_reference)
    }

    pub fn has_accepted_ask_for_bid(&self) -> bool {
        self.accepted_ask_for_bid
    }

    /// A record exactly as [`ExecutionState::new`] leaves it: `New`, version 1,
    /// nothing recorded yet.
    pub fn is_fresh(&self) -> bool {
        self.state == ExecutionStateType::New
            && self.version == 1
            && !self.accepted_ask_for_bid
            && self.status.is_empty()
            && self.verification_proposal.is_empty()
            && self.verification_result == VerificationResult::default()
            && self.published_result.is_none()
            && self.run_output.is_none()
            && self.create_time == self.update_time
    }

    /// True if the record holds exactly what `event` would have written.
    pub fn reflects(&self, event: &ExecutionEvent) -> bool {
        if self.state != event.kind().target() {
            return false;
        }
        match event {
            ExecutionEvent::AskForBid | ExecutionEvent::AcceptBid => true,
            ExecutionEvent::AcceptAskForBid => self.accepted_ask_for_bid,
            ExecutionEvent::RejectAskForBid { reason }
            | ExecutionEvent::RejectBid { reason }
            | ExecutionEvent::Fail { reason }
            | ExecutionEvent::Cancel { reason } => self.status == *reason,
            ExecutionEvent::ProposeResult {
                proposal,
                run_output,
            } => {
                self.verification_proposal == *proposal
                    && (run_output.is_none() || self.run_output == *run_output)
            }
            ExecutionEvent::Verify(result) => self.verification_result == *result,
            ExecutionEvent::Complete { published } => {
                self.published_result.as_ref() == Some(published)
            }
        }
    }

    /// Non-terminal: still able to move, and still occupying its node.
    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Apply `event` on behalf of `actor`, provided `expected_version` is the
    /// current version.
    ///
    /// Checks run in order: version, terminal state, table entry, actor,
    /// payload. A rejected event leaves the record untouched. Returns the
    /// state the record was in before the transition.
    pub fn apply(
        &mut self,
        actor: Actor,
        expected_version: u64,
        event: ExecutionEvent,
    ) -> Result<ExecutionStateType, ExecutionError> {
        if expected_version != self.version {
            return Err(ExecutionError::VersionConflict {
                id: self.id(),
                expected: expected_version,
                actual: self.version,
            });
        }

        let kind = event.kind();
        let rule = match rule_for(self.state, kind) {
            Some(rule) if !self.state.is_terminal() => rule,
            _ => {
                return Err(ExecutionError::IllegalTransition {
                    id: self.id(),
                    from: self.state,
                    event: kind,
                });
            }
        };

        if !rule.permits(actor) {
            return Err(ExecutionError::Unauthorized {
                id: self.id(),
                actor,
                event: kind,
            });
        }

        if let ExecutionEvent::Verify(result) = &event
            && !result.complete
        {
            return Err(ExecutionError::IncompleteVerification { id: self.id() });
        }

        match event {
            ExecutionEvent::AskForBid | ExecutionEvent::AcceptBid => {}
            ExecutionEvent::AcceptAskForBid => self.accepted_ask_for_bid = true,
            ExecutionEvent::RejectAskForBid { reason }
            | ExecutionEvent::RejectBid { reason }
            | ExecutionEvent::Fail { reason }
            | ExecutionEvent::Cancel { reason } => self.status = reason,
            ExecutionEvent::ProposeResult {
                proposal,
                run_output,
            } => {
                self.verification_proposal = proposal;
                if run_output.is_some() {
                    self.run_output = run_output;
                }
            }
            ExecutionEvent::Verify(result) => self.verification_result = result,
            ExecutionEvent::Complete { published } => self.published_result = Some(published),
        }

        let previous = self.state;
        self.state = rule.to;
        self.version += 1;
        self.update_time = Utc::now().max(self.update_time);
        Ok(previous)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id().fmt(f)
    }
}
