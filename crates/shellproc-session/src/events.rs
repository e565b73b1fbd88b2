//! Session notifications
//!
//! Two broadcast buses per session:
//! - [`EventBus`] carries lifecycle events ([`SessionEvent`])
//! - [`LineBus`] carries pushed output lines; its subscribers can be detached
//!   all at once without touching the lifecycle bus

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Channel capacity for broadcast events
const CHANNEL_CAPACITY: usize = 1024;

/// Exit details reported when the shell process ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellExecutionDetails {
    /// Exit code (0 when only a signal is known)
    pub exit_code: i32,
    /// Terminating signal, e.g. `SIGKILL`
    pub signal_name: Option<String>,
}

impl ShellExecutionDetails {
    /// Details reported when the shell could not be launched
    pub fn launch_failed() -> Self {
        Self {
            exit_code: 1,
            signal_name: None,
        }
    }
}

/// Lifecycle events of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The shell process ended (or never started)
    ShellExecutionComplete(ShellExecutionDetails),
    /// All output has been collected; carries the full output
    Completed(String),
    /// The caller may proceed
    Continue,
}

/// Lifecycle event bus
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        // Ignore errors - it's ok if there are no subscribers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Output line bus with detachable subscribers
#[derive(Debug)]
pub struct LineBus {
    sender: Mutex<broadcast::Sender<String>>,
}

impl LineBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender: Mutex::new(sender),
        }
    }

    pub fn publish(&self, lines: String) {
        let _ = self.sender.lock().send(lines);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.lock().subscribe()
    }

    /// Close every current subscription.
    ///
    /// Receivers see `RecvError::Closed` once they drain what was already
    /// delivered; later subscribers attach to a fresh channel.
    pub fn detach_all(&self) {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        *self.sender.lock() = sender;
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.lock().receiver_count()
    }
}

impl Default for LineBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_event_bus_fan_out() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(SessionEvent::Completed("out".to_string()));

        assert_eq!(first.recv().await.unwrap(), SessionEvent::Completed("out".to_string()));
        assert_eq!(second.recv().await.unwrap(), SessionEvent::Completed("out".to_string()));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(SessionEvent::Continue);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_all_closes_receivers() {
        let bus = LineBus::new();
        let mut rx = bus.subscribe();

        bus.publish("a\n".to_string());
        bus.detach_all();
        bus.publish("b\n".to_string());

        assert_eq!(rx.recv().await.unwrap(), "a\n");
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_launch_failed_details() {
        let details = ShellExecutionDetails::launch_failed();
        assert_eq!(details.exit_code, 1);
        assert!(details.signal_name.is_none());
    }
}
