//! Shared helpers for the workspace integration tests

use shellproc_session::{SessionEvent, ShellExecutionDetails};
use tokio::sync::broadcast;

/// Everything currently queued on an event receiver
pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Details of the first `ShellExecutionComplete` event, if any
pub fn completion_details(events: &[SessionEvent]) -> Option<ShellExecutionDetails> {
    events.iter().find_map(|event| match event {
        SessionEvent::ShellExecutionComplete(details) => Some(details.clone()),
        _ => None,
    })
}
