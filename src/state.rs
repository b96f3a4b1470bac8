//! Shared agent state guarded by a single lock.
//!
//! Every field is read and written under the same [`Mutex`]. Critical sections only
//! copy or assign fields; no I/O happens while the lock is held.

use std::sync::{Mutex, MutexGuard};

use crate::facts::Point2D;

/// Phase completion flags polled by the workflow driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionFlags {
    pub reasoning_done: bool,
    pub planning_done: bool,
    pub following_done: bool,
    pub charge_reached: bool,
    pub surveillance_done: bool,
}

/// Everything the coordinator and the battery monitor share about the robot.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub previous_location: String,
    pub next_location: String,
    pub current_point: Point2D,
    pub target_point: Point2D,
    pub via_points: Vec<Point2D>,
    pub battery_low: bool,
    pub map_completed: bool,
    pub flags: CompletionFlags,
}

impl AgentState {
    pub fn new(start_location: &str, start_point: Point2D) -> Self {
        Self {
            previous_location: start_location.to_string(),
            next_location: String::new(),
            current_point: start_point,
            target_point: start_point,
            via_points: Vec::new(),
            battery_low: false,
            map_completed: false,
            flags: CompletionFlags::default(),
        }
    }
}

/// [`AgentState`] behind one lock, so no reader sees a half-applied update.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<AgentState>,
}

impl SharedState {
    pub fn new(state: AgentState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    // A panic while holding the lock cannot leave a half-written field behind,
    // so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` with the lock held and returns its result.
    pub fn with<R>(&self, f: impl FnOnce(&mut AgentState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> AgentState {
        self.lock().clone()
    }

    /// Clears every completion flag in one critical section. `battery_low` is untouched.
    pub fn reset_flags(&self) {
        self.lock().flags = CompletionFlags::default();
    }

    pub fn flags(&self) -> CompletionFlags {
        self.lock().flags
    }

    pub fn set_battery_low(&self, low: bool) {
        self.lock().battery_low = low;
    }

    pub fn is_battery_low(&self) -> bool {
        self.lock().battery_low
    }

    pub fn is_world_ready(&self) -> bool {
        self.lock().map_completed
    }

    pub fn is_reasoning_done(&self) -> bool {
        self.lock().flags.reasoning_done
    }

    pub fn is_planning_done(&self) -> bool {
        self.lock().flags.planning_done
    }

    pub fn is_following_done(&self) -> bool {
        self.lock().flags.following_done
    }

    pub fn is_charge_reached(&self) -> bool {
        self.lock().flags.charge_reached
    }

    pub fn is_surveillance_done(&self) -> bool {
        self.lock().flags.surveillance_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        SharedState::new(AgentState::new("E", Point2D::default()))
    }

    #[test]
    fn reset_keeps_battery_flag() {
        let state = state();
        state.with(|s| {
            s.battery_low = true;
            s.flags = CompletionFlags {
                reasoning_done: true,
                planning_done: true,
                following_done: true,
                charge_reached: true,
                surveillance_done: true,
            };
        });

        state.reset_flags();
        assert_eq!(state.flags(), CompletionFlags::default());
        assert!(state.is_battery_low());

        state.reset_flags();
        assert_eq!(state.flags(), CompletionFlags::default());
        assert!(state.is_battery_low());
    }

    #[test]
    fn starts_at_the_given_location() {
        let snapshot = state().snapshot();
        assert_eq!(snapshot.previous_location, "E");
        assert!(snapshot.next_location.is_empty());
        assert!(!snapshot.battery_low);
        assert!(!snapshot.map_completed);
    }
}
