mod execution;
mod job_executions;
mod state;
mod transition;

pub use execution::{
    ExecutionId, ExecutionState, RunCommandResult, SHORT_ID_LENGTH, StorageSpec,
    VerificationResult, short_id,
};
pub use job_executions::{JobExecutions, VerificationTally};
pub use state::ExecutionStateType;
pub use transition::{Actor, EventKind, ExecutionEvent, Rule, Source, TRANSITIONS, rule_for};

#[cfg(test)]
pub(crate) use execution::tests as fixtures;
