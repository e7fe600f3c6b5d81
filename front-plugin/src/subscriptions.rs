use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use front_shared::FrontEvent;

use crate::error::WorkflowResult;
use crate::workflows::Action;

/// Something the plugin set up during initialization and must release on shutdown
pub trait Subscription: Send {
    fn name(&self) -> &str;

    fn dispose(self: Box<Self>) -> WorkflowResult<()>;
}

/// Logs every store event until disposed
pub struct EventLogger {
    handle: JoinHandle<()>,
}

impl EventLogger {
    /// Spawns the listener; needs a running tokio runtime
    pub fn spawn(mut receiver: broadcast::Receiver<FrontEvent>) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let payload = serde_json::to_string(&event).unwrap_or_default();
                        debug!(topic = event.topic(), "Store event: {}", payload);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event logger lagged behind, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { handle }
    }
}

impl Subscription for EventLogger {
    fn name(&self) -> &str {
        "event logger"
    }

    fn dispose(self: Box<Self>) -> WorkflowResult<()> {
        self.handle.abort();
        Ok(())
    }
}

/// The operator panel listing the demo actions
pub struct ActionPanel {
    actions: Vec<Action>,
}

impl ActionPanel {
    pub fn new(actions: &[Action]) -> Self {
        for action in actions {
            debug!("Registered action: {}", action.label());
        }
        Self { actions: actions.to_vec() }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

impl Subscription for ActionPanel {
    fn name(&self) -> &str {
        "action panel"
    }

    fn dispose(self: Box<Self>) -> WorkflowResult<()> {
        info!("Action panel closed, {} actions unregistered", self.actions.len());
        Ok(())
    }
}
