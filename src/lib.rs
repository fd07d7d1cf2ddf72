//! Execution tracking for bid-driven compute jobs.
//!
//! A requester asks compute nodes to bid on a job; every attempt is an
//! [`ExecutionState`] moving through bidding, execution, verification and
//! publication. Legality of each step lives in a static transition table,
//! and every write is a compare-and-swap on the record's version.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod resolver;
pub mod state_machine;
pub mod store;

pub use endpoint::{ComputeNodeEndpoint, Delivery, RequesterEndpoint};
pub use error::{ExecutionError, Result};
pub use resolver::{JobStateResolver, PollConfig, WaitCondition};
pub use state_machine::{
    Actor, ExecutionEvent, ExecutionId, ExecutionState, ExecutionStateType, JobExecutions,
    VerificationResult, VerificationTally,
};
pub use store::{InMemoryJobStore, JobStore, UpdateRequest};
