use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{info, warn};

use front_order::Operations;
use front_shared::FrontEvent;
use front_store::app_config::PluginSettings;

use crate::error::{report, WorkflowError, WorkflowResult};
use crate::subscriptions::{ActionPanel, EventLogger, Subscription};
use crate::workflows::{run_action, Action};

/// Lifecycle the host drives: initialize once with the façade and its event
/// feed, shut down once.
#[async_trait]
pub trait FrontPlugin: Send {
    fn name(&self) -> &str;

    async fn initialize(
        &mut self,
        operations: Arc<dyn Operations>,
        events: broadcast::Receiver<FrontEvent>,
    ) -> WorkflowResult<()>;

    /// Dispose whatever `initialize` set up, newest first
    async fn shutdown(&mut self) -> WorkflowResult<()>;
}

pub struct PaymentDemoPlugin {
    settings: PluginSettings,
    operations: Option<Arc<dyn Operations>>,
    subscriptions: Vec<Box<dyn Subscription>>,
}

impl PaymentDemoPlugin {
    pub fn new(settings: PluginSettings) -> Self {
        Self {
            settings,
            operations: None,
            subscriptions: Vec::new(),
        }
    }

    pub fn push_subscription(&mut self, subscription: Box<dyn Subscription>) {
        self.subscriptions.push(subscription);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn operations(&self) -> WorkflowResult<&dyn Operations> {
        self.operations.as_deref().ok_or_else(|| WorkflowError::Subscription {
            name: self.name().to_string(),
            reason: "plugin is not initialized".to_string(),
        })
    }

    /// Run one action; a failure is reported to the operator and returned
    pub async fn run(&self, action: Action) -> WorkflowResult<()> {
        let result = match self.operations() {
            Ok(ops) => run_action(ops, &self.settings, action).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            report(action.label(), e);
        }
        result
    }

    /// Run every action in panel order; returns how many failed
    pub async fn run_all(&self) -> usize {
        let mut failed = 0;
        for action in Action::ALL {
            if self.run(action).await.is_err() {
                failed += 1;
            }
        }
        failed
    }
}

#[async_trait]
impl FrontPlugin for PaymentDemoPlugin {
    fn name(&self) -> &str {
        "payment demo plugin"
    }

    async fn initialize(
        &mut self,
        operations: Arc<dyn Operations>,
        events: broadcast::Receiver<FrontEvent>,
    ) -> WorkflowResult<()> {
        info!("Initializing {}", self.name());

        let logger = EventLogger::spawn(events);
        self.push_subscription(Box::new(logger));
        self.push_subscription(Box::new(ActionPanel::new(&Action::ALL)));
        self.operations = Some(operations);

        info!("{} started", self.name());
        Ok(())
    }

    async fn shutdown(&mut self) -> WorkflowResult<()> {
        while let Some(subscription) = self.subscriptions.pop() {
            let name = subscription.name().to_string();
            if let Err(e) = subscription.dispose() {
                warn!("Failed to dispose {}: {}", name, e);
            }
        }
        self.operations = None;

        info!("{} stopped", self.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use front_store::{Config, EntityStore, FrontOperations};

    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Subscription for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn dispose(self: Box<Self>) -> WorkflowResult<()> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                return Err(WorkflowError::Subscription {
                    name: self.name.clone(),
                    reason: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn recorder(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Box<dyn Subscription> {
        Box::new(Recorder {
            name: name.to_string(),
            log: log.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_shutdown_disposes_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut plugin = PaymentDemoPlugin::new(Config::default().plugin);
        plugin.push_subscription(recorder("first", &log, false));
        plugin.push_subscription(recorder("second", &log, true));
        plugin.push_subscription(recorder("third", &log, false));

        plugin.shutdown().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
        assert_eq!(plugin.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_run_before_initialize_fails() {
        let plugin = PaymentDemoPlugin::new(Config::default().plugin);
        let err = plugin.run(Action::AddCashPayment).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Subscription { .. }));
    }

    #[tokio::test]
    async fn test_initialize_registers_subscriptions() {
        let config = Config::default();
        let store = Arc::new(EntityStore::from_config(&config).unwrap());
        let mut plugin = PaymentDemoPlugin::new(config.plugin.clone());

        let events = store.subscribe();
        let operations = Arc::new(FrontOperations::new(store, &config.plugin.user_name));
        plugin.initialize(operations, events).await.unwrap();
        assert_eq!(plugin.subscription_count(), 2);

        plugin.run(Action::AddCashPayment).await.unwrap();

        plugin.shutdown().await.unwrap();
        assert_eq!(plugin.subscription_count(), 0);
    }
}
