use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ExecutionError;

/// Lifecycle state of a single execution.
///
/// An execution is one attempt by one compute node to run a job. A node may
/// accumulate several executions for the same job through retries, but only
/// one of them may be live at any given time.
///
/// Variants are declared in creation order; the derived `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutionStateType {
    New,
    /// A node has been selected and is being asked to bid.
    AskForBid,
    /// The compute node agreed to attempt the job.
    AskForBidAccepted,
    /// The compute node declined the ask for bid.
    AskForBidRejected,
    /// The requester accepted the bid; the node is expected to be running.
    BidAccepted,
    /// The requester declined the bid.
    BidRejected,
    /// Execution finished and its result is waiting for verification.
    ResultProposed,
    /// Verification passed and publishing is in progress.
    ResultAccepted,
    /// Verification failed.
    ResultRejected,
    /// The result has been published.
    Completed,
    Failed,
    /// Aborted by the user.
    Canceled,
}

impl ExecutionStateType {
    /// Every state, in creation order.
    pub const ALL: [ExecutionStateType; 12] = [
        ExecutionStateType::New,
        ExecutionStateType::AskForBid,
        ExecutionStateType::AskForBidAccepted,
        ExecutionStateType::AskForBidRejected,
        ExecutionStateType::BidAccepted,
        ExecutionStateType::BidRejected,
        ExecutionStateType::ResultProposed,
        ExecutionStateType::ResultAccepted,
        ExecutionStateType::ResultRejected,
        ExecutionStateType::Completed,
        ExecutionStateType::Failed,
        ExecutionStateType::Canceled,
    ];

    /// True if the execution was discarded by a rejection, failure or
    /// cancellation and will never produce an accepted result.
    pub fn is_discarded(self) -> bool {
        matches!(
            self,
            ExecutionStateType::AskForBidRejected
                | ExecutionStateType::BidRejected
                | ExecutionStateType::ResultRejected
                | ExecutionStateType::Failed
                | ExecutionStateType::Canceled
        )
    }

    /// True if the execution is running or has produced output that is being
    /// (or has been) finalized.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ExecutionStateType::BidAccepted
                | ExecutionStateType::ResultProposed
                | ExecutionStateType::ResultAccepted
                | ExecutionStateType::Completed
        )
    }

    /// True if no further state change is possible.
    pub fn is_terminal(self) -> bool {
        self.is_discarded() || self == ExecutionStateType::Completed
    }

    /// Symbolic name used on the wire and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStateType::New => "New",
            ExecutionStateType::AskForBid => "AskForBid",
            ExecutionStateType::AskForBidAccepted => "AskForBidAccepted",
            ExecutionStateType::AskForBidRejected => "AskForBidRejected",
            ExecutionStateType::BidAccepted => "BidAccepted",
            ExecutionStateType::BidRejected => "BidRejected",
            ExecutionStateType::ResultProposed => "ResultProposed",
            ExecutionStateType::ResultAccepted => "ResultAccepted",
            ExecutionStateType::ResultRejected => "ResultRejected",
            ExecutionStateType::Completed => "Completed",
            ExecutionStateType::Failed => "Failed",
            ExecutionStateType::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for ExecutionStateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStateType {
    type Err = ExecutionError;

    /// Names match case-insensitively. Anything else is a hard error.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ExecutionError::UnknownState(name.to_string()))
    }
}

impl Serialize for ExecutionStateType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExecutionStateType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
