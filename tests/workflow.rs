//! End-to-end surveillance runs with simulated services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use surveillance_core::facts::{FollowGoal, PlanGoal};
use surveillance_core::kb::KbRequest;
use surveillance_core::sim::{SimulatedFollower, SimulatedPlanner, SimulatedRecharger};
use surveillance_core::task::task_channel;
use surveillance_core::{
    Error, Follower, GoalStatus, KbError, KnowledgeBase, KnowledgeBaseClient, MotionServices,
    Phase, Planner, Point2D, SledOntology, SurveillanceConfig, SurveillanceWorkflow,
    TaskCoordinator, TaskHandle,
};

fn config(dir: &tempfile::TempDir) -> SurveillanceConfig {
    SurveillanceConfig {
        ontology_file: dir.path().join("missing.json"),
        surveillance_ticks: 2,
        surveillance_tick_ms: 1,
        poll_interval_ms: 1,
        ..Default::default()
    }
}

fn simulated(config: &SurveillanceConfig) -> MotionServices {
    MotionServices {
        planner: Arc::new(SimulatedPlanner {
            environment_size: config.environment_size,
            max_via_points: 3,
            step: Duration::from_millis(1),
        }),
        follower: Arc::new(SimulatedFollower {
            step: Duration::from_millis(1),
        }),
        recharger: Arc::new(SimulatedRecharger {
            duration: Duration::from_millis(1),
        }),
    }
}

fn workflow(kb: KnowledgeBaseClient, dir: &tempfile::TempDir) -> SurveillanceWorkflow {
    let config = config(dir);
    let services = simulated(&config);
    workflow_with(kb, config, services)
}

fn workflow_with(
    kb: KnowledgeBaseClient,
    config: SurveillanceConfig,
    services: MotionServices,
) -> SurveillanceWorkflow {
    SurveillanceWorkflow::new(TaskCoordinator::new(config, kb, services).expect("valid config"))
}

fn sled_kb() -> KnowledgeBaseClient {
    KnowledgeBaseClient::new(Arc::new(SledOntology::temporary().unwrap()))
}

/// Fails the first planning goal, then plans like the simulator.
struct FlakyPlanner {
    calls: AtomicUsize,
    inner: SimulatedPlanner,
}

impl Planner for FlakyPlanner {
    fn plan(&self, goal: PlanGoal) -> TaskHandle<Vec<Point2D>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let (reporter, handle) = task_channel("planning");
            reporter.finish(GoalStatus::Aborted);
            return handle;
        }
        self.inner.plan(goal)
    }
}

/// Aborts the first goal, drops the second, then arrives at the last via-point.
struct FlakyFollower {
    calls: AtomicUsize,
}

impl Follower for FlakyFollower {
    fn follow(&self, goal: FollowGoal) -> TaskHandle<Point2D> {
        let (reporter, handle) = task_channel("following");
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => reporter.finish(GoalStatus::Aborted),
            1 => drop(reporter),
            _ => reporter.succeed(goal.via_points.last().copied().unwrap_or_default()),
        }
        handle
    }
}

struct UnreachableKb;

#[async_trait]
impl KnowledgeBase for UnreachableKb {
    async fn execute(&self, _request: KbRequest) -> Result<Vec<String>, KbError> {
        Err(KbError::Transport("connection refused".to_string()))
    }
}

#[tokio::test]
async fn robot_visits_urgent_rooms_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kb = sled_kb();
    let mut workflow = workflow(kb.clone(), &dir);

    let visits = workflow.run(Some(2)).await.unwrap();
    assert_eq!(visits, 2);
    assert_eq!(workflow.phase(), Phase::Idle);

    let state = workflow.coordinator().state().snapshot();
    let position = kb.query_object_property("isIn", "Robot1").await.unwrap();
    assert_eq!(position, vec![state.previous_location.clone()]);

    // From home only corridors are reachable; from there an urgent room is next.
    let classes = kb.query_classes(&state.previous_location).await.unwrap();
    assert!(classes.contains(&"ROOM".to_string()), "{classes:?}");

    let visited = kb
        .query_timestamps("visitedAt", &state.previous_location)
        .await
        .unwrap();
    let now = kb.query_timestamps("now", "Robot1").await.unwrap();
    assert_eq!(visited, now);
}

#[tokio::test]
async fn low_battery_sends_the_robot_home_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kb = sled_kb();
    let mut workflow = workflow(kb.clone(), &dir);
    workflow.coordinator().battery_monitor().on_event(true);

    let visits = workflow.run(Some(1)).await.unwrap();
    assert_eq!(visits, 1);
    assert!(!workflow.coordinator().is_battery_low());
}

#[tokio::test]
async fn isolated_robot_keeps_reasoning_until_a_door_appears() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kb = sled_kb();
    kb.add_object_property("isIn", "Robot1", "E").await.unwrap();
    kb.add_timestamp("now", "Robot1", 1_000_000_000).await.unwrap();
    kb.add_timestamp("visitedAt", "E", 1_000_000_000).await.unwrap();

    let mut workflow = workflow(kb.clone(), &dir);
    workflow.coordinator().state().with(|s| s.map_completed = true);

    let opener = kb.clone();
    let door = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        for (location, door) in [("E", "D1"), ("C1", "D1")] {
            opener.add_object_property("hasDoor", location, door).await.unwrap();
        }
        opener.add_timestamp("visitedAt", "C1", 1_000_000_000).await.unwrap();
    });

    let visits = workflow.run(Some(1)).await.unwrap();
    door.await.unwrap();
    assert_eq!(visits, 1);
    assert_eq!(
        kb.query_object_property("isIn", "Robot1").await.unwrap(),
        vec!["C1".to_string()]
    );
}

#[tokio::test]
async fn failed_and_lost_moves_restart_from_reasoning() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kb = sled_kb();
    let config = config(&dir);
    let follower = Arc::new(FlakyFollower {
        calls: AtomicUsize::new(0),
    });
    let services = MotionServices {
        follower: follower.clone(),
        ..simulated(&config)
    };
    let mut workflow = workflow_with(kb.clone(), config, services);

    let visits = workflow.run(Some(1)).await.unwrap();
    assert_eq!(visits, 1);
    assert_eq!(follower.calls.load(Ordering::SeqCst), 3);
    assert_eq!(workflow.phase(), Phase::Idle);

    // The robot only moved on the successful attempt.
    let state = workflow.coordinator().state().snapshot();
    assert_ne!(state.previous_location, "E");
    assert_eq!(
        kb.query_object_property("isIn", "Robot1").await.unwrap(),
        vec![state.previous_location]
    );
}

#[tokio::test]
async fn charging_is_retried_after_a_failed_plan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kb = sled_kb();
    let config = config(&dir);
    let planner = Arc::new(FlakyPlanner {
        calls: AtomicUsize::new(0),
        inner: SimulatedPlanner {
            environment_size: config.environment_size,
            max_via_points: 3,
            step: Duration::from_millis(1),
        },
    });
    let services = MotionServices {
        planner: planner.clone(),
        ..simulated(&config)
    };
    let mut workflow = workflow_with(kb, config, services);
    workflow.coordinator().battery_monitor().on_event(true);

    let visits = workflow.run(Some(1)).await.unwrap();
    assert_eq!(visits, 1);
    assert!(!workflow.coordinator().is_battery_low());
    // Failed charge leg, successful charge leg, then the patrol leg.
    assert_eq!(planner.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unreachable_knowledge_base_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kb = KnowledgeBaseClient::new(Arc::new(UnreachableKb));
    let mut workflow = workflow(kb, &dir);

    let err = workflow.run(Some(1)).await.unwrap_err();
    assert!(matches!(err, Error::Kb(KbError::Transport(_))), "{err:?}");
}
