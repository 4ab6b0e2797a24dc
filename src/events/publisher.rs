use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle event emitted by the reconciler and scheduler
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    /// One of [`crate::constants::events`]
    pub name: &'static str,
    pub workflow_id: Uuid,
    pub task_id: Option<Uuid>,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl LifecycleEvent {
    pub fn workflow(name: &'static str, workflow_id: Uuid, context: Value) -> Self {
        Self {
            name,
            workflow_id,
            task_id: None,
            context,
            published_at: chrono::Utc::now(),
        }
    }

    pub fn task(name: &'static str, workflow_id: Uuid, task_id: Uuid, context: Value) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::workflow(name, workflow_id, context)
        }
    }
}

/// Broadcast publisher for lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers; having none is fine
    pub fn publish(&self, event: LifecycleEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::new(8);
        let mut receiver = publisher.subscribe();
        let workflow_id = Uuid::now_v7();
        let task_id = Uuid::now_v7();

        publisher.publish(LifecycleEvent::task(
            events::TASK_DISPATCHED,
            workflow_id,
            task_id,
            json!({"handler": "VPC/CREATE"}),
        ));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, events::TASK_DISPATCHED);
        assert_eq!(event.task_id, Some(task_id));
        assert_eq!(event.context["handler"], "VPC/CREATE");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let publisher = EventPublisher::default();
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(LifecycleEvent::workflow(
            events::WORKFLOW_STARTED,
            Uuid::now_v7(),
            Value::Null,
        ));
    }
}
