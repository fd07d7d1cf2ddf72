use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::execution::{ExecutionId, ExecutionState};
use super::state::ExecutionStateType;
use super::transition::{Actor, ExecutionEvent};
use crate::error::ExecutionError;

/// Passed/failed counts over executions whose verification completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTally {
    pub passed: usize,
    pub failed: usize,
}

impl VerificationTally {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

/// All executions of one job, across nodes and retries.
///
/// Keeps a node → live execution index next to the full history so the
/// one-live-execution-per-node rule is checked without scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobExecutionsRecord", into = "JobExecutionsRecord")]
pub struct JobExecutions {
    job_id: String,
    executions: HashMap<ExecutionId, ExecutionState>,
    live_by_node: HashMap<String, ExecutionId>,
}

impl JobExecutions {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            executions: HashMap::new(),
            live_by_node: HashMap::new(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn get(&self, id: &ExecutionId) -> Option<&ExecutionState> {
        self.executions.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionState> {
        self.executions.values()
    }

    /// Every attempt made by `node_id`, oldest first, terminal ones included.
    pub fn by_node(&self, node_id: &str) -> Vec<&ExecutionState> {
        let mut attempts: Vec<_> = self
            .executions
            .values()
            .filter(|e| e.node_id == node_id)
            .collect();
        attempts.sort_by(|a, b| {
            a.create_time
                .cmp(&b.create_time)
                .then_with(|| a.compute_reference.cmp(&b.compute_reference))
        });
        attempts
    }

    /// The node's current non-terminal execution, if any.
    pub fn active_for_node(&self, node_id: &str) -> Option<&ExecutionState> {
        self.live_by_node
            .get(node_id)
            .and_then(|id| self.executions.get(id))
    }

    /// Register a new attempt. Only a fresh `New` record at version 1 is
    /// accepted; every later state is reached through [`JobExecutions::apply`].
    ///
    /// # Panics
    ///
    /// Panics if the execution belongs to a different job.
    pub fn create(&mut self, execution: ExecutionState) -> Result<(), ExecutionError> {
        if !execution.is_fresh() {
            return Err(ExecutionError::InvalidCreate {
                id: execution.id(),
                state: execution.state,
                version: execution.version,
            });
        }
        self.insert(execution)
    }

    /// Add a record in whatever state it is in. Used when rebuilding a set
    /// from its stored form.
    fn insert(&mut self, execution: ExecutionState) -> Result<(), ExecutionError> {
        assert_eq!(
            execution.job_id, self.job_id,
            "execution inserted into another job's set"
        );

        let id = execution.id();
        if self.executions.contains_key(&id) {
            return Err(ExecutionError::DuplicateExecution(id));
        }
        if execution.is_live() {
            if let Some(active) = self.live_by_node.get(&execution.node_id) {
                return Err(ExecutionError::ActiveExecutionExists {
                    node_id: execution.node_id.clone(),
                    active: active.clone(),
                });
            }
            self.live_by_node
                .insert(execution.node_id.clone(), id.clone());
        }
        self.executions.insert(id, execution);
        Ok(())
    }

    /// Version-checked transition of a single execution.
    pub fn apply(
        &mut self,
        id: &ExecutionId,
        actor: Actor,
        expected_version: u64,
        event: ExecutionEvent,
    ) -> Result<&ExecutionState, ExecutionError> {
        let execution = self
            .executions
            .get_mut(id)
            .ok_or_else(|| ExecutionError::ExecutionNotFound(id.clone()))?;

        execution.apply(actor, expected_version, event)?;

        if !execution.is_live() && self.live_by_node.get(&execution.node_id) == Some(id) {
            self.live_by_node.remove(&execution.node_id);
        }
        Ok(execution)
    }

    pub fn verification_tally(&self) -> VerificationTally {
        self.executions
            .values()
            .map(|e| e.verification_result)
            .filter(|r| r.complete)
            .fold(VerificationTally::default(), |mut tally, r| {
                if r.result {
                    tally.passed += 1;
                } else {
                    tally.failed += 1;
                }
                tally
            })
    }

    pub fn count_by_state(&self) -> BTreeMap<ExecutionStateType, usize> {
        let mut counts = BTreeMap::new();
        for execution in self.executions.values() {
            *counts.entry(execution.state).or_insert(0) += 1;
        }
        counts
    }

    /// True when there is at least one execution and none can move any more.
    pub fn all_terminal(&self) -> bool {
        !self.executions.is_empty() && self.executions.values().all(|e| e.state.is_terminal())
    }
}

/// Wire shape: the job id plus a flat, ordered list of executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobExecutionsRecord {
    #[serde(rename = "JobID")]
    job_id: String,
    #[serde(rename = "Executions", default)]
    executions: Vec<ExecutionState>,
}

impl From<JobExecutions> for JobExecutionsRecord {
    fn from(set: JobExecutions) -> Self {
        let mut executions: Vec<_> = set.executions.into_values().collect();
        executions.sort_by(|a, b| {
            a.create_time
                .cmp(&b.create_time)
                .then_with(|| a.id().cmp(&b.id()))
        });
        Self {
            job_id: set.job_id,
            executions,
        }
    }
}

impl TryFrom<JobExecutionsRecord> for JobExecutions {
    type Error = ExecutionError;

    fn try_from(record: JobExecutionsRecord) -> Result<Self, Self::Error> {
        let mut set = JobExecutions::new(record.job_id);
        for execution in record.executions {
            if execution.job_id != set.job_id {
                return Err(ExecutionError::ForeignExecution {
                    job_id: set.job_id,
                    id: execution.id(),
                });
            }
            set.insert(execution)?;
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::execution::tests::{advance_to, failed, passed, proposal};

    fn attempt(node: &str, reference: &str) -> ExecutionState {
        ExecutionState::new("job-1", node, reference)
    }

    fn live_per_node_at_most_one(set: &JobExecutions) -> bool {
        let mut live: HashMap<&str, usize> = HashMap::new();
        for execution in set.iter().filter(|e| e.is_live()) {
            *live.entry(execution.node_id.as_str()).or_default() += 1;
        }
        live.values().all(|&n| n <= 1)
    }

    #[test]
    fn lookup_by_id_is_exact() {
        let mut set = JobExecutions::new("job-1");
        set.insert(attempt("node-a", "e1")).unwrap();

        assert!(set.get(&ExecutionId::new("job-1", "node-a", "e1")).is_some());
        assert!(set.get(&ExecutionId::new("job-1", "node-a", "e2")).is_none());
        assert!(set.get(&ExecutionId::new("job-2", "node-a", "e1")).is_none());
    }

    #[test]
    fn create_refuses_pre_advanced_records() {
        let mut set = JobExecutions::new("job-1");

        let mut forged = attempt("node-a", "e1");
        forged.state = ExecutionStateType::BidAccepted;
        let err = set.create(forged).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::InvalidCreate {
                state: ExecutionStateType::BidAccepted,
                version: 1,
                ..
            }
        ));

        let mut advanced = attempt("node-a", "e2");
        advance_to(&mut advanced, ExecutionStateType::AskForBidAccepted);
        assert!(matches!(
            set.create(advanced).unwrap_err(),
            ExecutionError::InvalidCreate { .. }
        ));

        assert!(set.is_empty());
        assert!(set.active_for_node("node-a").is_none());
        set.create(attempt("node-a", "e3")).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut set = JobExecutions::new("job-1");
        set.insert(attempt("node-a", "e1")).unwrap();
        let mut again = attempt("node-a", "e1");
        again.state = ExecutionStateType::Failed;
        let err = set.insert(again).unwrap_err();
        assert!(matches!(err, ExecutionError::DuplicateExecution(_)));
    }

    #[test]
    fn retry_after_rejected_ask_for_bid_is_allowed() {
        let mut set = JobExecutions::new("job-1");
        let first = attempt("node-a", "e1");
        let first_id = first.id();
        set.insert(first).unwrap();

        set.apply(&first_id, Actor::Requester, 1, ExecutionEvent::AskForBid)
            .unwrap();
        set.apply(
            &first_id,
            Actor::ComputeNode,
            2,
            ExecutionEvent::RejectAskForBid {
                reason: "busy".into(),
            },
        )
        .unwrap();
        assert!(set.active_for_node("node-a").is_none());

        let mut second = attempt("node-a", "e2");
        advance_to(&mut second, ExecutionStateType::BidAccepted);
        let second_id = second.id();
        set.insert(second).unwrap();

        assert_eq!(set.active_for_node("node-a").unwrap().id(), second_id);
        assert_eq!(set.by_node("node-a").len(), 2);
        assert!(live_per_node_at_most_one(&set));
    }

    #[test]
    fn second_live_execution_on_same_node_is_rejected() {
        let mut set = JobExecutions::new("job-1");
        let mut first = attempt("node-a", "e1");
        advance_to(&mut first, ExecutionStateType::BidAccepted);
        let first_id = first.id();
        set.insert(first).unwrap();

        let err = set.insert(attempt("node-a", "e2")).unwrap_err();
        match err {
            ExecutionError::ActiveExecutionExists { node_id, active } => {
                assert_eq!(node_id, "node-a");
                assert_eq!(active, first_id);
            }
            other => panic!("expected ActiveExecutionExists, got {other:?}"),
        }

        // Other nodes are unaffected.
        set.insert(attempt("node-b", "e1")).unwrap();
        assert_eq!(set.len(), 2);
        assert!(live_per_node_at_most_one(&set));
    }

    #[test]
    fn terminal_executions_release_the_node() {
        let mut set = JobExecutions::new("job-1");
        let first = attempt("node-a", "e1");
        let id = first.id();
        set.insert(first).unwrap();
        set.apply(
            &id,
            Actor::Requester,
            1,
            ExecutionEvent::Cancel {
                reason: "superseded".into(),
            },
        )
        .unwrap();

        assert!(set.active_for_node("node-a").is_none());
        set.insert(attempt("node-a", "e2")).unwrap();
    }

    #[test]
    fn apply_to_missing_execution_is_not_found() {
        let mut set = JobExecutions::new("job-1");
        let err = set
            .apply(
                &ExecutionId::new("job-1", "ghost", "e1"),
                Actor::Requester,
                1,
                ExecutionEvent::AskForBid,
            )
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ExecutionNotFound(_)));
    }

    #[test]
    fn verification_tally_counts_completed_results() {
        let mut set = JobExecutions::new("job-1");
        for (node, verdict) in [("n1", passed()), ("n2", passed()), ("n3", failed())] {
            let mut execution = attempt(node, "e1");
            advance_to(&mut execution, ExecutionStateType::ResultProposed);
            execution
                .apply(Actor::Verifier, execution.version, ExecutionEvent::Verify(verdict))
                .unwrap();
            set.insert(execution).unwrap();
        }
        // Still running, no verdict yet.
        let mut pending = attempt("n4", "e1");
        advance_to(&mut pending, ExecutionStateType::BidAccepted);
        pending
            .apply(Actor::ComputeNode, pending.version, proposal())
            .unwrap();
        set.insert(pending).unwrap();

        let tally = set.verification_tally();
        assert_eq!(tally, VerificationTally { passed: 2, failed: 1 });
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn state_histogram_and_terminal_check() {
        let mut set = JobExecutions::new("job-1");
        assert!(!set.all_terminal());

        let mut done = attempt("n1", "e1");
        advance_to(&mut done, ExecutionStateType::Completed);
        set.insert(done).unwrap();
        let running = attempt("n2", "e1");
        let running_id = running.id();
        set.insert(running).unwrap();

        let counts = set.count_by_state();
        assert_eq!(counts[&ExecutionStateType::Completed], 1);
        assert_eq!(counts[&ExecutionStateType::New], 1);
        assert!(!set.all_terminal());

        set.apply(
            &running_id,
            Actor::System,
            1,
            ExecutionEvent::Fail {
                reason: "timeout".into(),
            },
        )
        .unwrap();
        assert!(set.all_terminal());
    }

    #[test]
    fn serde_round_trip_rebuilds_index() {
        let mut set = JobExecutions::new("job-1");
        let mut a = attempt("node-a", "e1");
        advance_to(&mut a, ExecutionStateType::ResultAccepted);
        set.insert(a).unwrap();
        let mut b = attempt("node-b", "e1");
        advance_to(&mut b, ExecutionStateType::Completed);
        set.insert(b).unwrap();

        let json = serde_json::to_string(&set).unwrap();
        let decoded: JobExecutions = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, set);
        assert!(decoded.active_for_node("node-a").is_some());
        assert!(decoded.active_for_node("node-b").is_none());
    }

    #[test]
    fn decoding_two_live_executions_on_one_node_fails() {
        let json = serde_json::json!({
            "JobID": "job-1",
            "Executions": [
                serde_json::to_value(attempt("node-a", "e1")).unwrap(),
                serde_json::to_value(attempt("node-a", "e2")).unwrap(),
            ]
        });
        assert!(serde_json::from_value::<JobExecutions>(json).is_err());
    }
}
