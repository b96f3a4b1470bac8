//! Decision-and-coordination core of a surveillance robot.
//!
//! This crate defines:
//! - [`TopologyGenerator`]: builds a randomized, always-connected map of rooms,
//!   corridors and doors and loads it into the knowledge base.
//! - [`Reasoner`]: picks the next location to visit, urgent rooms first.
//! - [`TaskCoordinator`]: drives planning and following, stamps visits in the
//!   knowledge base, and runs the surveillance dwell and recharge cycle.
//! - [`BatteryMonitor`]: applies asynchronous battery events to the shared state.
//! - [`KnowledgeBaseClient`]: typed access to the ontology service, with
//!   [`SledOntology`] as a local implementation.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod battery;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod facts;
pub mod kb;
pub mod reasoner;
pub mod sim;
pub mod state;
pub mod task;
pub mod topology;
pub mod workflow;

pub use battery::BatteryMonitor;
pub use config::SurveillanceConfig;
pub use coordinator::{MotionServices, SurveillanceOutcome, TaskCoordinator};
pub use error::{Error, KbError, Result, TaskError, TopologyError};
pub use facts::{Door, Location, LocationKind, Map, Point2D};
pub use kb::{KnowledgeBase, KnowledgeBaseClient, SledOntology};
pub use reasoner::Reasoner;
pub use state::{AgentState, CompletionFlags, SharedState};
pub use task::{Follower, GoalStatus, Planner, Recharger, TaskHandle};
pub use topology::TopologyGenerator;
pub use workflow::{Phase, SurveillanceWorkflow};

// Re-export for downstream crates that want to open their own ontology database
// without declaring a direct dependency on `sled`.
pub use sled;

/// Current unix time in whole seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
