//! The surveillance loop.
//!
//! A thin driver over [`TaskCoordinator`]: reason, plan, follow, surveil, and divert
//! to the charging station whenever the battery is found low at the top of a cycle
//! or cuts a dwell short.

use std::fmt;

use tracing::{debug, info, warn};

use crate::coordinator::{SurveillanceOutcome, TaskCoordinator};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reasoning,
    Planning,
    Following,
    Surveilling,
    Recharging,
    Charging,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub struct SurveillanceWorkflow {
    coordinator: TaskCoordinator,
    phase: Phase,
}

impl SurveillanceWorkflow {
    pub fn new(coordinator: TaskCoordinator) -> Self {
        Self {
            coordinator,
            phase: Phase::Idle,
        }
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
    }

    /// Runs until `max_visits` surveillance dwells have happened, or forever.
    /// Returns the number of dwells performed.
    pub async fn run(&mut self, max_visits: Option<usize>) -> Result<usize> {
        if !self.coordinator.is_world_ready() {
            self.coordinator.build_environment().await?;
        }

        let mut visits = 0;
        while max_visits.map_or(true, |max| visits < max) {
            if self.coordinator.is_battery_low() {
                match self.charge().await {
                    Ok(()) => {}
                    Err(Error::Task(e)) => {
                        warn!(error = %e, "charging station not reached, trying again");
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            self.enter(Phase::Reasoning);
            let target = match self.coordinator.reason().await {
                Ok(target) => target,
                Err(Error::NoReachableLocations(at)) => {
                    warn!(location = %at, "nothing reachable, reasoning again");
                    tokio::time::sleep(self.coordinator.config().poll_interval()).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.travel(&target).await {
                Ok(()) => {}
                Err(Error::Task(e)) => {
                    warn!(error = %e, target = %target, "motion failed, reasoning again");
                    continue;
                }
                Err(e) => return Err(e),
            }

            if self.coordinator.is_battery_low() {
                continue;
            }

            self.enter(Phase::Surveilling);
            if let SurveillanceOutcome::Interrupted { ticks } = self.coordinator.do_surveillance().await
            {
                debug!(ticks, "dwell cut short by low battery");
            }
            visits += 1;
        }

        self.enter(Phase::Idle);
        Ok(visits)
    }

    async fn travel(&mut self, target: &str) -> Result<()> {
        let interval = self.coordinator.config().poll_interval();

        self.enter(Phase::Planning);
        self.coordinator.start_planning(target);
        while !self.coordinator.poll_planning()? {
            tokio::time::sleep(interval).await;
        }

        self.enter(Phase::Following);
        self.coordinator.start_following()?;
        let mut warned = false;
        while !self.coordinator.poll_following().await? {
            // Motion is never cancelled; the battery is handled once we arrive.
            if !warned && self.coordinator.is_battery_low() {
                info!(target = %target, "battery low while moving, finishing the move first");
                warned = true;
            }
            tokio::time::sleep(interval).await;
        }
        Ok(())
    }

    async fn charge(&mut self) -> Result<()> {
        self.enter(Phase::Recharging);
        self.coordinator.go_to_charge().await?;
        self.enter(Phase::Charging);
        self.coordinator.recharge().await
    }
}
