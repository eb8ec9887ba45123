//! Card presence tracking
//!
//! Presence has two sources: the status query run when the channel opens,
//! and the 2-byte notifications the reader pushes on its interrupt
//! endpoint. Both feed one [`PresenceMonitor`] and the most recent
//! observation wins.

use std::fmt;

use tracing::debug;

use crate::{
    codec::{Pipe, ResponseFrame},
    constants::{notification, response},
    error::{Error, Result},
    event::PresenceEvent,
    transport::UsbDevice,
};

/// Whether a card sits in the slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Presence {
    /// A card is inserted
    Present,
    /// The slot is empty
    #[default]
    Absent,
}

impl Presence {
    /// Whether a card is inserted
    pub const fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }
}

impl From<bool> for Presence {
    fn from(present: bool) -> Self {
        if present { Self::Present } else { Self::Absent }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "card present"),
            Self::Absent => write!(f, "no card"),
        }
    }
}

/// Decode an interrupt notification
///
/// A notification is exactly two bytes: the marker `0x50` followed by
/// `0x02` (removed) or `0x03` (inserted). Anything else is an error.
pub fn decode_notification(bytes: &[u8]) -> Result<Presence> {
    match bytes {
        [notification::MARKER, notification::REMOVED] => Ok(Presence::Absent),
        [notification::MARKER, notification::INSERTED] => Ok(Presence::Present),
        other => Err(Error::UnexpectedNotification(other.to_vec())),
    }
}

/// Reader state reported by a status query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStatus {
    /// Whether the status byte reports an inserted card
    pub card_present: bool,
    /// Human-readable text following the header
    pub description: String,
}

/// Parse a status-query response
///
/// The low two bits of the status byte give the slot state: a powered or
/// unpowered card both count as present, an empty slot as absent.
pub fn parse_status_response(frame: &ResponseFrame) -> Result<ReaderStatus> {
    let bytes = frame.as_bytes();
    if bytes.len() < response::MIN_STATUS_LEN {
        return Err(Error::ShortTransfer {
            expected: response::MIN_STATUS_LEN,
            actual: bytes.len(),
        });
    }

    let card_present = matches!(
        bytes[response::STATUS_OFFSET] & response::SLOT_STATE_MASK,
        response::SLOT_CARD_ACTIVE | response::SLOT_CARD_INACTIVE
    );
    let description = String::from_utf8_lossy(&bytes[response::PAYLOAD_OFFSET..])
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string();

    Ok(ReaderStatus {
        card_present,
        description,
    })
}

/// Single owner of the presence state
#[derive(Debug, Default, Clone)]
pub struct PresenceMonitor {
    state: Presence,
    pending: Option<PresenceEvent>,
}

impl PresenceMonitor {
    /// Start from a known state
    pub const fn new(initial: Presence) -> Self {
        Self {
            state: initial,
            pending: None,
        }
    }

    /// Last known presence
    pub const fn state(&self) -> Presence {
        self.state
    }

    /// Record an observation from either source
    ///
    /// A change of state queues an event for [`take_event`](Self::take_event).
    pub fn observe(&mut self, presence: Presence) {
        if presence != self.state {
            self.pending = Some(match presence {
                Presence::Present => PresenceEvent::Inserted,
                Presence::Absent => PresenceEvent::Removed,
            });
            debug!("Presence changed: {presence}");
        }
        self.state = presence;
    }

    /// Take the event queued by the last state change, if any
    pub const fn take_event(&mut self) -> Option<PresenceEvent> {
        self.pending.take()
    }

    /// Poll the interrupt endpoint once and return the resulting presence
    ///
    /// A poll that times out leaves the state unchanged. A malformed
    /// notification or a transfer failure is an error and also leaves the
    /// state unchanged.
    pub fn poll<D: UsbDevice>(&mut self, pipe: &mut Pipe<D>) -> Result<Presence> {
        if let Some(bytes) = pipe.poll_interrupt()? {
            let presence = decode_notification(&bytes)?;
            self.observe(presence);
        }
        Ok(self.state)
    }
}
