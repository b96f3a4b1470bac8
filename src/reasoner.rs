//! Next-destination selection.
//!
//! Urgent locations first, then corridors, then whatever is reachable. Ties are
//! broken by shuffling the reachable set before partitioning it.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::kb::KnowledgeBaseClient;
use crate::state::SharedState;

pub const URGENT: &str = "URGENT";
pub const CORRIDOR: &str = "CORRIDOR";

/// A reachable location and the class labels the knowledge base gave it.
pub type Candidate = (String, Vec<String>);

/// Applies the priority policy to already shuffled candidates.
///
/// A location labelled both urgent and corridor counts in both buckets.
pub fn select_target(candidates: &[Candidate]) -> Option<String> {
    let has = |labels: &[String], wanted: &str| labels.iter().any(|l| l == wanted);

    let urgent: Vec<&String> = candidates
        .iter()
        .filter(|(_, labels)| has(labels, URGENT))
        .map(|(id, _)| id)
        .collect();
    let corridors: Vec<&String> = candidates
        .iter()
        .filter(|(_, labels)| has(labels, CORRIDOR))
        .map(|(id, _)| id)
        .collect();

    if let Some(first) = urgent.first() {
        debug!(?urgent, "urgent locations reachable");
        return Some((*first).clone());
    }
    if let Some(first) = corridors.first() {
        debug!(?corridors, "no urgent location, staying on corridors");
        return Some((*first).clone());
    }
    debug!("no urgent location or corridor reachable");
    candidates.first().map(|(id, _)| id.clone())
}

/// Chooses where the robot goes next from what the knowledge base infers.
#[derive(Debug, Clone)]
pub struct Reasoner {
    kb: KnowledgeBaseClient,
    state: Arc<SharedState>,
    robot: String,
}

impl Reasoner {
    pub fn new(kb: KnowledgeBaseClient, state: Arc<SharedState>, robot: impl Into<String>) -> Self {
        Self {
            kb,
            state,
            robot: robot.into(),
        }
    }

    /// Picks the next location to visit from `previous`.
    #[tracing::instrument(skip(self))]
    pub async fn reason(&self, previous: &str) -> Result<String> {
        self.state.reset_flags();

        self.kb.reason().await?;
        let mut reachable = self.kb.query_object_property("canReach", &self.robot).await?;
        reachable.shuffle(&mut rand::thread_rng());
        if reachable.is_empty() {
            return Err(Error::NoReachableLocations(previous.to_string()));
        }

        let mut candidates = Vec::with_capacity(reachable.len());
        for location in reachable {
            let labels = self.kb.query_classes(&location).await?;
            candidates.push((location, labels));
        }
        info!(?candidates, "reachable locations");

        let target = select_target(&candidates)
            .ok_or_else(|| Error::NoReachableLocations(previous.to_string()))?;
        self.state.with(|s| {
            s.next_location = target.clone();
            s.flags.reasoning_done = true;
        });
        info!(target = %target, "next location chosen");
        Ok(target)
    }
}
