//! Reader session
//!
//! A [`Session`] owns the single permitted connection to the reader. The
//! connection lives in an `Option`, so opening twice is rejected with
//! [`Error::AlreadyOpen`] rather than silently replacing the old handle,
//! and every operation on a closed session fails with [`Error::NoChannel`].

use std::{fmt, sync::Arc};

use tracing::{debug, info, instrument};

use crate::{
    atr::Atr,
    codec::{CommandCode, Pipe},
    config::ReaderConfig,
    error::{Error, Result},
    event::{PresenceEvent, PresenceEventHandler},
    observer::{FrameObserver, TracingObserver},
    power::{PowerAction, PowerMachine, PowerState},
    presence::{Presence, PresenceMonitor, ReaderStatus, parse_status_response},
    transport::UsbBus,
};

/// State that only exists while the device is open
#[derive(Debug)]
struct Channel<D> {
    pipe: Pipe<D>,
    power: PowerMachine,
    presence: PresenceMonitor,
    status: ReaderStatus,
}

impl<D> Channel<D> {
    /// Deliver a queued presence change; a removed card takes its ATR with it
    fn settle_presence(&mut self, handler: Option<&mut (dyn PresenceEventHandler + 'static)>) {
        let Some(event) = self.presence.take_event() else {
            return;
        };
        if event == PresenceEvent::Removed {
            self.power.invalidate();
        }
        if let Some(handler) = handler {
            handler.handle_event(event);
        }
    }
}

/// Owned session with at most one open reader channel
pub struct Session<B: UsbBus> {
    /// Where devices come from
    bus: B,
    /// Device IDs, endpoints and timeouts
    config: ReaderConfig,
    /// Frame observer handed to every new channel
    observer: Arc<dyn FrameObserver>,
    /// Presence event handler, if any
    events: Option<Box<dyn PresenceEventHandler>>,
    /// Open channel, if any
    channel: Option<Channel<B::Device>>,
}

impl<B: UsbBus> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("bus", &self.bus)
            .field("config", &self.config)
            .field("open", &self.channel.is_some())
            .field("has_event_handler", &self.events.is_some())
            .finish()
    }
}

impl<B: UsbBus> Session<B> {
    /// Create a closed session tracing frames through `tracing`
    pub fn new(bus: B, config: ReaderConfig) -> Self {
        Self {
            bus,
            config,
            observer: Arc::new(TracingObserver),
            events: None,
            channel: None,
        }
    }

    /// Replace the frame observer used by channels opened from now on
    pub fn with_observer(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Install a handler for presence events
    pub fn set_event_handler<H>(&mut self, handler: H)
    where
        H: PresenceEventHandler + 'static,
    {
        self.events = Some(Box::new(handler));
    }

    /// Session configuration
    pub const fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Underlying bus
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Whether a channel is open
    pub const fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Open the reader channel
    ///
    /// Opens the device, runs the status query to learn whether a card is
    /// present, then powers the card down. Any failure closes the device
    /// again. Fails with [`Error::AlreadyOpen`] if a channel is open.
    #[instrument(
        level = "debug",
        skip(self),
        fields(vid = self.config.vendor_id, pid = self.config.product_id)
    )]
    pub fn open(&mut self) -> Result<()> {
        if self.channel.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let device = self.bus.open(&self.config)?;
        let mut pipe = Pipe::new(device, self.config.clone(), Arc::clone(&self.observer));

        let frame = pipe.send_receive(CommandCode::StatusQuery)?;
        let status = parse_status_response(&frame)?;
        let presence = PresenceMonitor::new(status.card_present.into());

        debug!("Initial power down");
        pipe.send_receive(CommandCode::PowerDown)?;

        info!(
            "Reader channel open ({}, {})",
            status.description,
            presence.state()
        );
        self.channel = Some(Channel {
            pipe,
            power: PowerMachine::new(),
            presence,
            status,
        });
        Ok(())
    }

    /// Close the reader channel, returning whether one was open
    ///
    /// Closing a closed session does nothing.
    pub fn close(&mut self) -> bool {
        let was_open = self.channel.take().is_some();
        if was_open {
            info!("Reader channel closed");
        }
        was_open
    }

    fn channel(&mut self) -> Result<&mut Channel<B::Device>> {
        self.channel.as_mut().ok_or(Error::NoChannel)
    }

    /// Power the card up, returning its ATR
    pub fn power_up(&mut self) -> Result<Atr> {
        let channel = self.channel()?;
        channel.power.power_up(&mut channel.pipe)
    }

    /// Power the card down
    pub fn power_down(&mut self) -> Result<()> {
        let channel = self.channel()?;
        channel.power.power_down(&mut channel.pipe)
    }

    /// Apply a power action and copy any resulting ATR into `buffer`
    ///
    /// Returns the number of ATR bytes written. When the buffer is too small
    /// for the ATR the call fails with [`Error::InsufficientBuffer`] and
    /// writes nothing, but the card stays powered and the ATR stays cached.
    /// A bare reset is not supported.
    pub fn power_card(&mut self, action: PowerAction, buffer: &mut [u8]) -> Result<usize> {
        match action {
            PowerAction::PowerUp => self.power_up()?.copy_to(buffer),
            PowerAction::PowerDown => self.power_down().map(|()| 0),
            PowerAction::Reset => {
                self.channel()?;
                Err(Error::NotSupported("reset"))
            }
        }
    }

    /// Cached ATR, if the card is powered
    pub fn atr(&self) -> Option<&Atr> {
        self.channel.as_ref().and_then(|c| c.power.atr())
    }

    /// Power state, if a channel is open
    pub fn power_state(&self) -> Option<&PowerState> {
        self.channel.as_ref().map(|c| c.power.state())
    }

    /// Poll for presence changes and return the current presence
    ///
    /// Raises a presence event when the state changes.
    pub fn presence(&mut self) -> Result<Presence> {
        let channel = self.channel.as_mut().ok_or(Error::NoChannel)?;
        let presence = channel.presence.poll(&mut channel.pipe)?;

        channel.settle_presence(self.events.as_deref_mut());
        Ok(presence)
    }

    /// Last known presence, without polling
    pub fn last_presence(&self) -> Option<Presence> {
        self.channel.as_ref().map(|c| c.presence.state())
    }

    /// Status reported when the channel was opened or last refreshed
    pub fn status(&self) -> Option<&ReaderStatus> {
        self.channel.as_ref().map(|c| &c.status)
    }

    /// Re-run the status query and fold its presence bit into the state
    pub fn refresh_status(&mut self) -> Result<ReaderStatus> {
        let channel = self.channel.as_mut().ok_or(Error::NoChannel)?;
        let frame = channel.pipe.send_receive(CommandCode::StatusQuery)?;
        let status = parse_status_response(&frame)?;

        channel.presence.observe(status.card_present.into());
        channel.settle_presence(self.events.as_deref_mut());
        channel.status = status.clone();
        Ok(status)
    }

    /// Sequence number the next command will carry, if a channel is open
    pub fn next_sequence(&self) -> Option<u8> {
        self.channel.as_ref().map(|c| c.pipe.next_sequence())
    }
}

impl<B: UsbBus> Drop for Session<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, SimulatedReader};
    use crate::transport::TransportError;
    use parking_lot::Mutex;

    fn session(reader: SimulatedReader) -> (MockBus, Session<MockBus>) {
        let bus = MockBus::new(reader);
        let session = Session::new(bus.clone(), ReaderConfig::default());
        (bus, session)
    }

    #[test]
    fn test_open_runs_status_then_power_down() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        session.open().unwrap();

        assert_eq!(bus.reader().sent_codes(), vec![0x60, 0x63]);
        assert_eq!(session.last_presence(), Some(Presence::Present));
        assert_eq!(
            session.status().map(|s| s.description.as_str()),
            Some("EZ100PU Simulated Reader")
        );
        assert_eq!(session.next_sequence(), Some(2));
    }

    #[test]
    fn test_open_claims_configured_interface() {
        let bus = MockBus::new(SimulatedReader::with_card());
        let mut session = Session::new(bus.clone(), ReaderConfig::new().with_interface(Some(0)));
        session.open().unwrap();
        assert_eq!(bus.reader().claimed, Some(0));

        session.close();
        assert_eq!(bus.reader().claimed, None);
    }

    #[test]
    fn test_second_open_is_rejected() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        session.open().unwrap();

        assert_eq!(session.open(), Err(Error::AlreadyOpen));
        assert_eq!(bus.open_handles(), 1);
        assert!(session.is_open());
    }

    #[test]
    fn test_failed_open_releases_device() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        bus.reader().fail_next_read = Some(TransportError::Timeout);

        assert_eq!(
            session.open(),
            Err(Error::Transport(TransportError::Timeout))
        );
        assert!(!session.is_open());
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_open_without_device() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        bus.reader().attached = false;
        assert!(matches!(
            session.open(),
            Err(Error::Transport(TransportError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        session.open().unwrap();

        assert!(session.close());
        assert!(!session.close());
        assert_eq!(bus.open_handles(), 0);
        assert_eq!(session.power_up(), Err(Error::NoChannel));
        assert_eq!(session.presence(), Err(Error::NoChannel));
    }

    #[test]
    fn test_reset_not_supported() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        session.open().unwrap();
        let before = bus.sent_frames().len();

        let mut buffer = [0u8; 33];
        assert_eq!(
            session.power_card(PowerAction::Reset, &mut buffer),
            Err(Error::NotSupported("reset"))
        );
        assert_eq!(bus.sent_frames().len(), before);
    }

    #[test]
    fn test_small_buffer_keeps_cache() {
        let atr = [0x3b, 0x8f, 0x80, 0x01, 0x80];
        let (_bus, mut session) = session(SimulatedReader::with_card().with_atr(&atr));
        session.open().unwrap();

        let mut buffer = [0u8; 4];
        assert_eq!(
            session.power_card(PowerAction::PowerUp, &mut buffer),
            Err(Error::InsufficientBuffer {
                required: 5,
                available: 4
            })
        );
        assert_eq!(buffer, [0u8; 4]);
        assert_eq!(session.atr().map(|a| a.as_bytes()), Some(&atr[..]));
    }

    #[test]
    fn test_removal_event_drops_atr() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session.set_event_handler(move |event: PresenceEvent| sink.lock().push(event));
        session.open().unwrap();
        session.power_up().unwrap();

        bus.reader().remove_card();
        assert_eq!(session.presence(), Ok(Presence::Absent));
        assert_eq!(session.atr(), None);

        bus.reader().insert_card();
        assert_eq!(session.presence(), Ok(Presence::Present));

        assert_eq!(
            events.lock().as_slice(),
            &[PresenceEvent::Removed, PresenceEvent::Inserted]
        );
    }

    #[test]
    fn test_refresh_status_updates_presence() {
        let (bus, mut session) = session(SimulatedReader::empty());
        session.open().unwrap();
        assert_eq!(session.last_presence(), Some(Presence::Absent));

        // card slipped in without a notification
        bus.reader().card_present = true;
        let status = session.refresh_status().unwrap();
        assert!(status.card_present);
        assert_eq!(session.last_presence(), Some(Presence::Present));
    }

    #[test]
    fn test_refresh_status_keeps_powered_card() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session.set_event_handler(move |event: PresenceEvent| sink.lock().push(event));
        session.open().unwrap();
        let atr = session.power_up().unwrap();
        assert!(bus.reader().powered);

        let status = session.refresh_status().unwrap();
        assert!(status.card_present);
        assert_eq!(session.last_presence(), Some(Presence::Present));
        assert_eq!(session.atr(), Some(&atr));
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_refresh_status_sees_empty_slot() {
        let (bus, mut session) = session(SimulatedReader::with_card());
        session.open().unwrap();
        session.power_up().unwrap();

        // card pulled without a notification
        {
            let mut reader = bus.reader();
            reader.card_present = false;
            reader.powered = false;
        }
        assert!(!session.refresh_status().unwrap().card_present);
        assert_eq!(session.last_presence(), Some(Presence::Absent));
        assert_eq!(session.atr(), None);
    }
}
