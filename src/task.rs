//! Contract with the asynchronous motion services.
//!
//! A service accepts a goal and immediately hands back a [`TaskHandle`]. The
//! service side keeps the paired [`TaskReporter`] and publishes status changes
//! through it; the handle can be peeked (`status`, `result`) by a polling driver
//! or awaited (`wait`) by code that wants a completion notification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::TaskError;
use crate::facts::{FollowGoal, PlanGoal, Point2D};

/// Status code reported by a task service once its result is available.
pub const TERMINAL_SUCCESS: u8 = 3;

/// Goal lifecycle, numbered like actionlib's `GoalStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalStatus {
    Pending,
    Active,
    Preempted,
    Succeeded,
    Aborted,
    Rejected,
    Recalled,
    Lost,
}

impl GoalStatus {
    pub fn code(self) -> u8 {
        match self {
            GoalStatus::Pending => 0,
            GoalStatus::Active => 1,
            GoalStatus::Preempted => 2,
            GoalStatus::Succeeded => TERMINAL_SUCCESS,
            GoalStatus::Aborted => 4,
            GoalStatus::Rejected => 5,
            GoalStatus::Recalled => 8,
            GoalStatus::Lost => 9,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, GoalStatus::Pending | GoalStatus::Active)
    }

    pub fn is_success(self) -> bool {
        self.code() == TERMINAL_SUCCESS
    }
}

#[derive(Debug, Clone)]
struct TaskState<T> {
    status: GoalStatus,
    result: Option<T>,
}

/// Service-side half: publishes progress for one goal.
#[derive(Debug)]
pub struct TaskReporter<T> {
    tx: watch::Sender<TaskState<T>>,
}

/// Client-side half: observes one dispatched goal.
#[derive(Debug)]
pub struct TaskHandle<T> {
    task: &'static str,
    rx: watch::Receiver<TaskState<T>>,
}

/// Creates the reporter/handle pair for a freshly accepted goal.
pub fn task_channel<T>(task: &'static str) -> (TaskReporter<T>, TaskHandle<T>) {
    let (tx, rx) = watch::channel(TaskState {
        status: GoalStatus::Pending,
        result: None,
    });
    (TaskReporter { tx }, TaskHandle { task, rx })
}

impl<T> TaskReporter<T> {
    pub fn set_active(&self) {
        self.tx.send_modify(|s| s.status = GoalStatus::Active);
    }

    pub fn succeed(self, result: T) {
        self.tx.send_modify(|s| {
            s.status = GoalStatus::Succeeded;
            s.result = Some(result);
        });
    }

    /// Ends the goal without a result. `status` should be terminal.
    pub fn finish(self, status: GoalStatus) {
        self.tx.send_modify(|s| s.status = status);
    }
}

impl<T: Clone> TaskHandle<T> {
    pub fn name(&self) -> &'static str {
        self.task
    }

    /// Current status. A reporter dropped mid-goal reads as [`GoalStatus::Lost`].
    pub fn status(&self) -> GoalStatus {
        let status = self.rx.borrow().status;
        if !status.is_terminal() && self.rx.has_changed().is_err() {
            GoalStatus::Lost
        } else {
            status
        }
    }

    /// The result, once the goal has succeeded.
    pub fn result(&self) -> Option<T> {
        let state = self.rx.borrow();
        if state.status.is_success() {
            state.result.clone()
        } else {
            None
        }
    }

    /// `Ok(None)` while running, the result on success, an error on any other
    /// terminal status.
    pub fn check(&self) -> Result<Option<T>, TaskError> {
        match self.status() {
            GoalStatus::Pending | GoalStatus::Active => Ok(None),
            GoalStatus::Succeeded => Ok(self.result()),
            GoalStatus::Lost => Err(TaskError::Lost { task: self.task }),
            status => Err(TaskError::Failed {
                task: self.task,
                status,
            }),
        }
    }

    /// Waits for the goal to reach a terminal status.
    pub async fn wait(&mut self) -> Result<T, TaskError> {
        let task = self.task;
        let state = self
            .rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map_err(|_| TaskError::Lost { task })?;
        match (state.status, &state.result) {
            (GoalStatus::Succeeded, Some(result)) => Ok(result.clone()),
            (GoalStatus::Lost, _) | (GoalStatus::Succeeded, None) => Err(TaskError::Lost { task }),
            (status, _) => Err(TaskError::Failed { task, status }),
        }
    }
}

/// Path planning service: from the current point to a target point.
pub trait Planner: Send + Sync {
    fn plan(&self, goal: PlanGoal) -> TaskHandle<Vec<Point2D>>;
}

/// Path following service: drives along via-points, returns the reached point.
pub trait Follower: Send + Sync {
    fn follow(&self, goal: FollowGoal) -> TaskHandle<Point2D>;
}

/// Synchronous recharge call: "start charging", answered once the battery is full.
#[async_trait]
pub trait Recharger: Send + Sync {
    async fn recharge(&self) -> Result<bool, String>;
}
