//! Simulated collaborators.
//!
//! Stand-ins for the planning, following, recharge and battery services so the
//! coordinator can run end-to-end without a robot. Paths are random via-points,
//! motion is a sleep per via-point.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;

use crate::facts::{FollowGoal, PlanGoal, Point2D};
use crate::task::{task_channel, Follower, GoalStatus, Planner, Recharger, TaskHandle};

#[derive(Debug, Clone)]
pub struct SimulatedPlanner {
    pub environment_size: [f32; 2],
    /// Upper bound on via-points per path, target included.
    pub max_via_points: usize,
    pub step: Duration,
}

impl Planner for SimulatedPlanner {
    fn plan(&self, goal: PlanGoal) -> TaskHandle<Vec<Point2D>> {
        let (reporter, handle) = task_channel("planning");
        let [width, height] = self.environment_size;
        let via_points: Vec<Point2D> = {
            let mut rng = rand::thread_rng();
            let count = rng.gen_range(1..=self.max_via_points.max(1));
            let mut points: Vec<Point2D> = (1..count)
                .map(|_| Point2D::new(rng.gen_range(0.0..width), rng.gen_range(0.0..height)))
                .collect();
            points.push(goal.target);
            points
        };
        let step = self.step;

        tokio::spawn(async move {
            reporter.set_active();
            for point in &via_points {
                tokio::time::sleep(step).await;
                debug!(x = point.x(), y = point.y(), "via-point planned");
            }
            reporter.succeed(via_points);
        });
        handle
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedFollower {
    pub step: Duration,
}

impl Follower for SimulatedFollower {
    fn follow(&self, goal: FollowGoal) -> TaskHandle<Point2D> {
        let (reporter, handle) = task_channel("following");
        let step = self.step;

        tokio::spawn(async move {
            let Some(last) = goal.via_points.last().copied() else {
                reporter.finish(GoalStatus::Rejected);
                return;
            };
            reporter.set_active();
            for point in &goal.via_points {
                tokio::time::sleep(step).await;
                debug!(x = point.x(), y = point.y(), "via-point reached");
            }
            reporter.succeed(last);
        });
        handle
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedRecharger {
    pub duration: Duration,
}

#[async_trait]
impl Recharger for SimulatedRecharger {
    async fn recharge(&self) -> Result<bool, String> {
        tokio::time::sleep(self.duration).await;
        Ok(true)
    }
}

/// Publishes a "battery low" event after every random discharge period drawn
/// from `discharge`, until the receiver is dropped.
pub fn battery_events(discharge: (Duration, Duration)) -> mpsc::Receiver<bool> {
    let (tx, rx) = mpsc::channel(4);
    let (min, max) = (discharge.0.min(discharge.1), discharge.0.max(discharge.1));
    tokio::spawn(async move {
        loop {
            let wait = rand::thread_rng().gen_range(min..=max);
            tokio::time::sleep(wait).await;
            if tx.send(true).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn planned_path_ends_at_target() {
        let planner = SimulatedPlanner {
            environment_size: [10.0, 10.0],
            max_via_points: 4,
            step: Duration::from_millis(1),
        };
        let target = Point2D::new(8.0, 2.0);
        let mut handle = planner.plan(PlanGoal {
            current: Point2D::default(),
            target,
        });
        let path = handle.wait().await.unwrap();
        assert!((1..=4).contains(&path.len()));
        assert_eq!(path.last(), Some(&target));
    }

    #[tokio::test]
    async fn follower_reports_last_via_point() {
        let follower = SimulatedFollower {
            step: Duration::from_millis(1),
        };
        let mut handle = follower.follow(FollowGoal {
            via_points: vec![Point2D::new(1.0, 1.0), Point2D::new(3.2, 7.5)],
        });
        assert_eq!(handle.wait().await.unwrap(), Point2D::new(3.2, 7.5));

        let mut empty = follower.follow(FollowGoal { via_points: vec![] });
        assert!(empty.wait().await.is_err());
    }

    #[tokio::test]
    async fn battery_source_emits_low_events() {
        let mut events = battery_events((Duration::from_millis(1), Duration::from_millis(3)));
        assert_eq!(events.recv().await, Some(true));
        assert_eq!(events.recv().await, Some(true));
    }
}
