//! Sequencing of planning, following, surveillance and recharge.
//!
//! [`TaskCoordinator`] owns the shared [`AgentState`](crate::state::AgentState) and
//! the handles of in-flight motion goals. The workflow driver calls one operation
//! per phase and polls the `is_*` predicates to decide the next transition.
//!
//! Goals are never cancelled: once planning or following is dispatched it runs to
//! its own end. A goal ending in anything but success is reported as
//! [`Error::Task`] rather than polled forever.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::battery::BatteryMonitor;
use crate::config::SurveillanceConfig;
use crate::error::{Error, Result};
use crate::facts::{FollowGoal, Map, PlanGoal, Point2D};
use crate::kb::KnowledgeBaseClient;
use crate::reasoner::Reasoner;
use crate::state::{AgentState, SharedState};
use crate::task::{task_channel, Follower, Planner, Recharger, TaskHandle};
use crate::topology::TopologyGenerator;
use crate::unix_now;

/// The external task services the coordinator drives.
#[derive(Clone)]
pub struct MotionServices {
    pub planner: Arc<dyn Planner>,
    pub follower: Arc<dyn Follower>,
    pub recharger: Arc<dyn Recharger>,
}

/// How a surveillance dwell ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveillanceOutcome {
    Completed { ticks: u32 },
    /// The battery went low before the dwell finished.
    Interrupted { ticks: u32 },
}

/// Drives one robot through planning, following, surveillance and recharge,
/// keeping the knowledge base in step with its moves.
pub struct TaskCoordinator {
    config: SurveillanceConfig,
    kb: KnowledgeBaseClient,
    state: Arc<SharedState>,
    reasoner: Reasoner,
    services: MotionServices,
    planning: Option<TaskHandle<Vec<Point2D>>>,
    /// Via-points of the last successful plan, until following consumes them.
    plan: Option<Vec<Point2D>>,
    following: Option<TaskHandle<Point2D>>,
}

impl std::fmt::Debug for TaskCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCoordinator")
            .field("robot", &self.config.robot)
            .field("state", &self.state.snapshot())
            .field("planning_in_flight", &self.planning.is_some())
            .field("plan_captured", &self.plan.is_some())
            .field("following_in_flight", &self.following.is_some())
            .finish()
    }
}

impl TaskCoordinator {
    /// The robot starts at the charging location, at the configured initial point.
    /// Fails if `config` does not validate.
    pub fn new(
        config: SurveillanceConfig,
        kb: KnowledgeBaseClient,
        services: MotionServices,
    ) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(SharedState::new(AgentState::new(
            &config.charge_location,
            config.init_point(),
        )));
        let reasoner = Reasoner::new(kb.clone(), state.clone(), config.robot.clone());
        Ok(Self {
            config,
            kb,
            state,
            reasoner,
            services,
            planning: None,
            plan: None,
            following: None,
        })
    }

    pub fn config(&self) -> &SurveillanceConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    /// A monitor writing into this coordinator's state.
    pub fn battery_monitor(&self) -> BatteryMonitor {
        BatteryMonitor::new(self.state.clone())
    }

    /// Loads the ontology, generates the map into it, and marks the world ready.
    pub async fn build_environment(&self) -> Result<Map> {
        let path = self.config.ontology_file.to_string_lossy();
        self.kb.load_file(&path, &self.config.ontology_iri).await?;
        info!(path = %path, "ontology loaded");

        let map = TopologyGenerator::new(self.config.clone())
            .build_environment(&self.kb, unix_now())
            .await?;
        self.state.with(|s| s.map_completed = true);
        Ok(map)
    }

    pub fn is_world_ready(&self) -> bool {
        self.state.is_world_ready()
    }

    pub fn is_reasoning_done(&self) -> bool {
        self.state.is_reasoning_done()
    }

    pub fn is_planning_done(&self) -> bool {
        self.state.is_planning_done()
    }

    pub fn is_following_done(&self) -> bool {
        self.state.is_following_done()
    }

    pub fn is_charge_reached(&self) -> bool {
        self.state.is_charge_reached()
    }

    pub fn is_surveillance_done(&self) -> bool {
        self.state.is_surveillance_done()
    }

    pub fn is_battery_low(&self) -> bool {
        self.state.is_battery_low()
    }

    /// Clears all completion flags, leaving the battery flag alone.
    pub fn reset_flags(&self) {
        self.state.reset_flags();
    }

    /// Chooses the next location from where the robot currently is.
    pub async fn reason(&self) -> Result<String> {
        let previous = self.state.with(|s| s.previous_location.clone());
        info!(location = %previous, "robot position");
        self.reasoner.reason(&previous).await
    }

    /// Dispatches a planning goal towards `target`.
    ///
    /// The target point is sampled uniformly inside the environment bounds; actual
    /// path geometry belongs to the planning service.
    pub fn start_planning(&mut self, target: &str) {
        self.state.reset_flags();
        let [width, height] = self.config.environment_size;
        let target_point = {
            let mut rng = rand::thread_rng();
            Point2D::new(rng.gen_range(0.0..width), rng.gen_range(0.0..height))
        };
        let goal = self.state.with(|s| {
            s.next_location = target.to_string();
            s.target_point = target_point;
            s.via_points.clear();
            PlanGoal {
                current: s.current_point,
                target: target_point,
            }
        });
        info!(target = %target, x = target_point.x(), y = target_point.y(), "planning");
        self.plan = None;
        self.planning = Some(self.services.planner.plan(goal));
    }

    fn plan_completed(&mut self, via_points: Vec<Point2D>) {
        info!(via_points = via_points.len(), "path found");
        self.state.with(|s| {
            s.via_points = via_points.clone();
            s.flags.planning_done = true;
        });
        self.plan = Some(via_points);
    }

    /// Captures the via-points once planning has succeeded. Returns whether it has.
    pub fn poll_planning(&mut self) -> Result<bool> {
        let Some(handle) = &self.planning else {
            return Ok(self.state.is_planning_done());
        };
        match handle.check() {
            Ok(None) => Ok(false),
            Ok(Some(via_points)) => {
                self.planning = None;
                self.plan_completed(via_points);
                Ok(true)
            }
            Err(e) => {
                debug!(task = handle.name(), error = %e, "goal ended without a result");
                self.planning = None;
                Err(e.into())
            }
        }
    }

    /// Waits for the in-flight planning goal to finish.
    pub async fn wait_planning(&mut self) -> Result<()> {
        let mut handle = self.planning.take().ok_or(Error::NoActivePlan)?;
        let via_points = handle.wait().await?;
        self.plan_completed(via_points);
        Ok(())
    }

    /// Dispatches a following goal along the captured via-points.
    ///
    /// An empty path means the planner found the robot already at the target: no
    /// goal is sent and the arrival is recorded on the next poll.
    pub fn start_following(&mut self) -> Result<()> {
        self.state.reset_flags();
        let via_points = self.plan.take().ok_or(Error::NoActivePlan)?;
        if via_points.is_empty() {
            info!("empty path, already at the target");
            let (reporter, handle) = task_channel("following");
            reporter.succeed(self.state.with(|s| s.current_point));
            self.following = Some(handle);
            return Ok(());
        }
        info!(via_points = via_points.len(), "following path");
        self.following = Some(self.services.follower.follow(FollowGoal { via_points }));
        Ok(())
    }

    /// Records the arrival once following has succeeded. Returns whether it has.
    pub async fn poll_following(&mut self) -> Result<bool> {
        let Some(handle) = &self.following else {
            return Ok(self.state.is_following_done());
        };
        let reached = match handle.check() {
            Ok(None) => return Ok(false),
            Ok(Some(reached)) => reached,
            Err(e) => {
                debug!(task = handle.name(), error = %e, "goal ended without a result");
                self.following = None;
                return Err(e.into());
            }
        };
        self.following = None;
        self.arrive(reached).await?;
        self.state.with(|s| s.flags.following_done = true);
        Ok(true)
    }

    /// Waits for the in-flight following goal and records the arrival.
    pub async fn wait_following(&mut self) -> Result<()> {
        let mut handle = self.following.take().ok_or(Error::NoActivePlan)?;
        let reached = handle.wait().await?;
        self.arrive(reached).await?;
        self.state.with(|s| s.flags.following_done = true);
        Ok(())
    }

    /// Moves the robot to the next location in the knowledge base and stamps both
    /// its last motion and the location's last visit with the same time.
    async fn arrive(&self, reached: Point2D) -> Result<()> {
        let (previous, next) = self.state.with(|s| {
            s.current_point = reached;
            (s.previous_location.clone(), s.next_location.clone())
        });
        let robot = self.config.robot.as_str();

        self.kb
            .replace_object_property("isIn", robot, &next, &previous)
            .await?;
        self.state.with(|s| s.previous_location = next.clone());
        info!(location = %next, x = reached.x(), y = reached.y(), "arrived");

        self.kb.reason().await?;
        let now = unix_now();
        self.stamp("now", robot, now).await?;
        self.stamp("visitedAt", &next, now).await?;
        Ok(())
    }

    async fn stamp(&self, property: &str, subject: &str, now: i64) -> Result<()> {
        let previous = self.kb.query_timestamps(property, subject).await?;
        match previous.first() {
            Some(old) => {
                self.kb
                    .replace_timestamp(property, subject, now, *old)
                    .await?
            }
            None => {
                warn!(property, subject, "no previous timestamp, adding one");
                self.kb.add_timestamp(property, subject, now).await?
            }
        }
        Ok(())
    }

    /// Drives the robot to the charging location, planning then following to
    /// completion.
    #[tracing::instrument(skip(self))]
    pub async fn go_to_charge(&mut self) -> Result<()> {
        self.state.reset_flags();
        let home = self.config.charge_location.clone();
        info!(target = %home, "battery low, heading to the charging station");

        self.start_planning(&home);
        self.wait_planning().await?;
        self.start_following()?;
        self.wait_following().await?;

        self.state.with(|s| s.flags.charge_reached = true);
        Ok(())
    }

    /// Blocks on the recharge service, then marks the battery as full.
    pub async fn recharge(&self) -> Result<()> {
        let charged = self
            .services
            .recharger
            .recharge()
            .await
            .map_err(Error::Recharge)?;
        if !charged {
            return Err(Error::Recharge("service did not acknowledge".to_string()));
        }
        self.state.set_battery_low(false);
        info!("robot recharged");
        Ok(())
    }

    /// Dwells at the current location for the configured number of ticks, leaving
    /// early as soon as the battery is low.
    pub async fn do_surveillance(&self) -> SurveillanceOutcome {
        self.state.reset_flags();
        let location = self.state.with(|s| s.previous_location.clone());
        info!(location = %location, "surveilling");

        let max = self.config.surveillance_ticks;
        let mut ticks = 0;
        while ticks < max && !self.state.is_battery_low() {
            tokio::time::sleep(self.config.surveillance_tick()).await;
            ticks += 1;
        }

        let outcome = if ticks < max {
            info!(location = %location, ticks, "surveillance interrupted, going to charge");
            SurveillanceOutcome::Interrupted { ticks }
        } else {
            info!(location = %location, "location checked");
            SurveillanceOutcome::Completed { ticks }
        };
        self.state.with(|s| s.flags.surveillance_done = true);
        outcome
    }
}
