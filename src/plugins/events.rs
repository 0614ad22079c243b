use tokio::sync::broadcast;

/// Lifecycle transitions published for operator visibility. Delivery is
/// fire-and-forget; lagging receivers simply drop events.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginEvent {
    Registered { name: String },
    Created { name: String },
    Initialized { name: String },
    InitializationFailed { name: String, reason: String },
    CleanedUp { name: String },
    HealthCheckFailed { name: String, consecutive_failures: u32 },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PluginEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PluginEvent) {
        // Err just means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(PluginEvent::Registered {
            name: "alpha".into(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, PluginEvent::Registered { name: "alpha".into() });
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new(8);
        bus.publish(PluginEvent::Created { name: "beta".into() });
    }
}
