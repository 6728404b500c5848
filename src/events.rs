//! Fan-out hub for node events consumed by the viewer WebSocket. Sends
//! never block: subscribers that fall behind simply miss events.

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 128;

#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<String>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Delivers the event to current subscribers, if any.
    pub fn send(&self, event: impl Into<String>) {
        let _ = self.sender.send(event.into());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        hub.send("block: 1");
        assert_eq!(rx.recv().await.unwrap(), "block: 1");
    }

    #[test]
    fn send_without_subscribers_does_not_panic() {
        let hub = EventHub::new();
        hub.send("dropped");
    }
}
