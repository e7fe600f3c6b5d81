use tokio::sync::broadcast;
use tracing::{debug, info};

use front_shared::FrontEvent;

/// In-process fan-out of committed domain events.
///
/// Events are only published after the change they describe is visible in
/// the store, so a subscriber may read the store back from its handler.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FrontEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FrontEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: FrontEvent) {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => info!("Published {} to {} subscriber(s)", topic, receivers),
            // Nobody listening is not an error
            Err(_) => debug!("Dropped {}: no subscribers", topic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use front_shared::models::events::CafeSessionChangedEvent;
    use uuid::Uuid;

    fn session_event() -> FrontEvent {
        FrontEvent::CafeSessionChanged(CafeSessionChangedEvent {
            session_id: Uuid::new_v4(),
            is_open: true,
            user_id: Uuid::new_v4(),
            timestamp: 0,
        })
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(session_event());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic(), "cafe.session");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        bus.publish(session_event());
    }
}
