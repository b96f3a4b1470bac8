//! Error types for the surveillance core.

use thiserror::Error;

use crate::task::GoalStatus;

/// Failures talking to the knowledge base.
#[derive(Debug, Error)]
pub enum KbError {
    /// The service could not be reached at all. Raised by remote
    /// [`KnowledgeBase`](crate::kb::KnowledgeBase) implementations.
    #[error("knowledge base unavailable: {0}")]
    Transport(String),

    #[error("knowledge base rejected {command}: {reason}")]
    Rejected { command: String, reason: String },

    #[error("malformed knowledge base response {raw:?}: expected {expected}")]
    Malformed { raw: String, expected: &'static str },

    #[error("knowledge base storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("knowledge base snapshot error: {0}")]
    Snapshot(String),
}

/// A motion task finished without delivering a result.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{task} task ended with status {status:?}")]
    Failed { task: &'static str, status: GoalStatus },

    #[error("{task} task service dropped the goal before finishing")]
    Lost { task: &'static str },
}

/// Room, corridor and door counts the wiring pattern cannot realize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("at least one interior corridor besides home is required")]
    NoInteriorCorridor,

    #[error("{rooms} rooms cannot be spread over {interior} interior corridors")]
    TooFewRooms { rooms: usize, interior: usize },

    #[error("{rooms} rooms and {corridors} corridors need exactly {required} doors, got {doors}")]
    DoorCount {
        rooms: usize,
        corridors: usize,
        required: usize,
        doors: usize,
    },
}

/// Everything the surveillance core can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("no location is reachable from {0}")]
    NoReachableLocations(String),

    #[error("following requested before any plan completed")]
    NoActivePlan,

    #[error("recharge service failed: {0}")]
    Recharge(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
