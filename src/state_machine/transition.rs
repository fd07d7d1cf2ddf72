use std::fmt;

use serde::{Deserialize, Serialize};

use super::execution::{RunCommandResult, StorageSpec, VerificationResult};
use super::state::ExecutionStateType;

/// The party requesting a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    Requester,
    ComputeNode,
    Verifier,
    /// Internal supervision, e.g. a timeout sweeper.
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Requester => write!(f, "requester"),
            Actor::ComputeNode => write!(f, "compute node"),
            Actor::Verifier => write!(f, "verifier"),
            Actor::System => write!(f, "system"),
        }
    }
}

/// Payload-free discriminant of an [`ExecutionEvent`], used as the table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AskForBid,
    AcceptAskForBid,
    RejectAskForBid,
    AcceptBid,
    RejectBid,
    ProposeResult,
    AcceptResult,
    RejectResult,
    Complete,
    Fail,
    Cancel,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::AskForBid,
        EventKind::AcceptAskForBid,
        EventKind::RejectAskForBid,
        EventKind::AcceptBid,
        EventKind::RejectBid,
        EventKind::ProposeResult,
        EventKind::AcceptResult,
        EventKind::RejectResult,
        EventKind::Complete,
        EventKind::Fail,
        EventKind::Cancel,
    ];

    /// The state every legal application of this event leads to.
    pub fn target(self) -> ExecutionStateType {
        match self {
            EventKind::AskForBid => ExecutionStateType::AskForBid,
            EventKind::AcceptAskForBid => ExecutionStateType::AskForBidAccepted,
            EventKind::RejectAskForBid => ExecutionStateType::AskForBidRejected,
            EventKind::AcceptBid => ExecutionStateType::BidAccepted,
            EventKind::RejectBid => ExecutionStateType::BidRejected,
            EventKind::ProposeResult => ExecutionStateType::ResultProposed,
            EventKind::AcceptResult => ExecutionStateType::ResultAccepted,
            EventKind::RejectResult => ExecutionStateType::ResultRejected,
            EventKind::Complete => ExecutionStateType::Completed,
            EventKind::Fail => ExecutionStateType::Failed,
            EventKind::Cancel => ExecutionStateType::Canceled,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A state change request together with the data it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionEvent {
    AskForBid,
    AcceptAskForBid,
    RejectAskForBid { reason: String },
    AcceptBid,
    RejectBid { reason: String },
    ProposeResult {
        proposal: Vec<u8>,
        run_output: Option<RunCommandResult>,
    },
    /// Verifier outcome. A passing result accepts, a failing one rejects.
    Verify(VerificationResult),
    Complete { published: StorageSpec },
    Fail { reason: String },
    Cancel { reason: String },
}

impl ExecutionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ExecutionEvent::AskForBid => EventKind::AskForBid,
            ExecutionEvent::AcceptAskForBid => EventKind::AcceptAskForBid,
            ExecutionEvent::RejectAskForBid { .. } => EventKind::RejectAskForBid,
            ExecutionEvent::AcceptBid => EventKind::AcceptBid,
            ExecutionEvent::RejectBid { .. } => EventKind::RejectBid,
            ExecutionEvent::ProposeResult { .. } => EventKind::ProposeResult,
            ExecutionEvent::Verify(result) if result.result => EventKind::AcceptResult,
            ExecutionEvent::Verify(_) => EventKind::RejectResult,
            ExecutionEvent::Complete { .. } => EventKind::Complete,
            ExecutionEvent::Fail { .. } => EventKind::Fail,
            ExecutionEvent::Cancel { .. } => EventKind::Cancel,
        }
    }
}

/// Which states a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    State(ExecutionStateType),
    AnyNonTerminal,
}

impl Source {
    fn matches(self, state: ExecutionStateType) -> bool {
        match self {
            Source::State(s) => s == state,
            Source::AnyNonTerminal => !state.is_terminal(),
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub from: Source,
    pub event: EventKind,
    pub to: ExecutionStateType,
    pub actors: &'static [Actor],
}

impl Rule {
    pub fn permits(&self, actor: Actor) -> bool {
        self.actors.contains(&actor)
    }
}

use Actor::{ComputeNode, Requester, System, Verifier};
use ExecutionStateType as S;

const fn rule(
    from: ExecutionStateType,
    event: EventKind,
    to: ExecutionStateType,
    actors: &'static [Actor],
) -> Rule {
    Rule {
        from: Source::State(from),
        event,
        to,
        actors,
    }
}

/// The complete set of legal transitions. Anything not listed is illegal.
pub const TRANSITIONS: &[Rule] = &[
    rule(S::New, EventKind::AskForBid, S::AskForBid, &[Requester]),
    rule(S::AskForBid, EventKind::AcceptAskForBid, S::AskForBidAccepted, &[ComputeNode]),
    rule(S::AskForBid, EventKind::RejectAskForBid, S::AskForBidRejected, &[ComputeNode]),
    rule(S::AskForBidAccepted, EventKind::AcceptBid, S::BidAccepted, &[Requester]),
    rule(S::AskForBidAccepted, EventKind::RejectBid, S::BidRejected, &[Requester]),
    rule(S::BidAccepted, EventKind::ProposeResult, S::ResultProposed, &[ComputeNode]),
    rule(S::ResultProposed, EventKind::AcceptResult, S::ResultAccepted, &[Requester, Verifier]),
    rule(S::ResultProposed, EventKind::RejectResult, S::ResultRejected, &[Requester, Verifier]),
    rule(S::ResultAccepted, EventKind::Complete, S::Completed, &[Requester]),
    Rule {
        from: Source::AnyNonTerminal,
        event: EventKind::Fail,
        to: S::Failed,
        actors: &[System, Requester, ComputeNode],
    },
    Rule {
        from: Source::AnyNonTerminal,
        event: EventKind::Cancel,
        to: S::Canceled,
        actors: &[Requester],
    },
];

/// Look up the rule for `event` applied in state `from`.
pub fn rule_for(from: ExecutionStateType, event: EventKind) -> Option<&'static Rule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.event == event && rule.from.matches(from))
}

impl ExecutionStateType {
    /// States reachable in a single legal step.
    pub fn successors(self) -> Vec<ExecutionStateType> {
        let mut next: Vec<_> = EventKind::ALL
            .into_iter()
            .filter_map(|event| rule_for(self, event).map(|rule| rule.to))
            .collect();
        next.sort();
        next.dedup();
        next
    }
}
