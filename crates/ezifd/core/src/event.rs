//! Card presence events
//!
//! Events are raised synchronously from the caller's presence poll; there
//! is no background thread. Handlers are closures or anything implementing
//! [`PresenceEventHandler`]; [`forward_to`] adapts a channel sender.

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Card insertion or removal observed by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A card was inserted
    Inserted,
    /// The card was removed
    Removed,
}

/// Trait for handling presence events
pub trait PresenceEventHandler: Send {
    /// Handle a presence event
    fn handle_event(&mut self, event: PresenceEvent);
}

// Implement handlers for closures
impl<F> PresenceEventHandler for F
where
    F: FnMut(PresenceEvent) + Send,
{
    fn handle_event(&mut self, event: PresenceEvent) {
        self(event)
    }
}

/// Sender for presence events
pub type PresenceEventSender = Sender<PresenceEvent>;

/// Receiver for presence events
pub type PresenceEventReceiver = Receiver<PresenceEvent>;

/// Handler forwarding every event into a channel
pub fn forward_to(sender: PresenceEventSender) -> impl PresenceEventHandler {
    move |event: PresenceEvent| {
        // a dropped receiver just means nobody is listening
        let _ = sender.send(event);
    }
}

/// Create an unbounded channel for presence events
pub fn presence_event_channel() -> (PresenceEventSender, PresenceEventReceiver) {
    unbounded()
}
