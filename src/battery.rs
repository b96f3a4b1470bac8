//! Battery status consumer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::state::SharedState;

/// Applies battery events to the shared state. The only writer of `battery_low`
/// besides the recharge acknowledgement.
#[derive(Debug, Clone)]
pub struct BatteryMonitor {
    state: Arc<SharedState>,
}

impl BatteryMonitor {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    /// Stores one event. Repeats are applied like any other event.
    pub fn on_event(&self, low: bool) {
        self.state.set_battery_low(low);
        if low {
            info!("battery low, recharging needed");
        } else {
            info!("battery full");
        }
    }

    /// Consumes `events` until every sender is gone.
    pub fn spawn(self, mut events: mpsc::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(low) = events.recv().await {
                self.on_event(low);
            }
            debug!("battery event stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Point2D;
    use crate::state::AgentState;

    #[tokio::test]
    async fn applies_every_event_in_order() {
        let state = Arc::new(SharedState::new(AgentState::new("E", Point2D::default())));
        let (tx, rx) = mpsc::channel(8);
        let worker = BatteryMonitor::new(state.clone()).spawn(rx);

        for low in [true, true, false, true] {
            tx.send(low).await.unwrap();
        }
        drop(tx);
        worker.await.unwrap();

        assert!(state.is_battery_low());
    }
}
