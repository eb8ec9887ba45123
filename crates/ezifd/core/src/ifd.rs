//! IFD handler boundary
//!
//! [`IfdHandler`] exposes a [`Session`] through the fixed entry points a
//! smart-card middleware expects from a reader driver. Every entry point
//! answers with a numeric [`ResponseCode`]; no error crosses this boundary
//! in any other form.

use tracing::{debug, info, warn};

use crate::{
    config::ReaderConfig,
    error::Error,
    power::PowerAction,
    presence::Presence,
    session::Session,
    transport::UsbBus,
};

/// Logical unit number addressing a reader slot
pub type Lun = u32;

/// Result of an entry point that fills a caller buffer
pub type IfdResult<T> = std::result::Result<T, ResponseCode>;

/// Response codes returned across the handler boundary
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Operation succeeded
    Success = 0,
    /// Unknown capability tag
    ErrorTag = 600,
    /// Capability could not be set
    ErrorSetFailure = 601,
    /// Capability is read only
    ErrorValueReadOnly = 602,
    /// Protocol type selection failed
    ErrorPtsFailure = 605,
    /// Reader control not supported
    ErrorNotSupported = 606,
    /// Requested protocol not supported
    ProtocolNotSupported = 607,
    /// Power action failed
    ErrorPowerAction = 608,
    /// Communication with the reader failed
    CommunicationError = 612,
    /// Reader did not answer in time
    ResponseTimeout = 613,
    /// Operation not supported
    NotSupported = 614,
    /// A card is present
    IccPresent = 615,
    /// No card is present
    IccNotPresent = 616,
    /// No such device
    NoSuchDevice = 617,
    /// Caller buffer too small
    ErrorInsufficientBuffer = 618,
}

impl ResponseCode {
    /// Numeric value of the code
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Whether this is [`ResponseCode::Success`]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<ResponseCode> for u32 {
    fn from(code: ResponseCode) -> Self {
        code.code()
    }
}

/// Capability tags the handler answers
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Cached answer-to-reset
    Atr = 0x0303,
    /// Number of slots on the reader
    SlotsNumber = 0x0FAE,
    /// Whether the driver provides a presence polling thread with timeout
    PollingThreadWithTimeout = 0x0FB3,
}

impl TryFrom<u32> for Tag {
    type Error = u32;

    fn try_from(tag: u32) -> std::result::Result<Self, u32> {
        match tag {
            0x0303 => Ok(Self::Atr),
            0x0FAE => Ok(Self::SlotsNumber),
            0x0FB3 => Ok(Self::PollingThreadWithTimeout),
            other => Err(other),
        }
    }
}

/// Numeric power action codes
pub mod action {
    /// Power up the card
    pub const POWER_UP: u32 = 500;
    /// Power down the card
    pub const POWER_DOWN: u32 = 501;
    /// Reset the card
    pub const RESET: u32 = 502;
}

impl TryFrom<u32> for PowerAction {
    type Error = u32;

    fn try_from(code: u32) -> std::result::Result<Self, u32> {
        match code {
            action::POWER_UP => Ok(Self::PowerUp),
            action::POWER_DOWN => Ok(Self::PowerDown),
            action::RESET => Ok(Self::Reset),
            other => Err(other),
        }
    }
}

/// Translate a power path error
const fn power_error(error: &Error) -> ResponseCode {
    match error {
        Error::InsufficientBuffer { .. } => ResponseCode::ErrorPowerAction,
        Error::NotSupported(_) => ResponseCode::NotSupported,
        _ => ResponseCode::CommunicationError,
    }
}

/// Reader driver entry points over a single session
#[derive(Debug)]
pub struct IfdHandler<B: UsbBus> {
    session: Session<B>,
}

impl<B: UsbBus> IfdHandler<B> {
    /// Create a handler with a closed session
    pub fn new(bus: B, config: ReaderConfig) -> Self {
        Self::from_session(Session::new(bus, config))
    }

    /// Wrap an existing session
    pub const fn from_session(session: Session<B>) -> Self {
        Self { session }
    }

    /// Underlying session
    pub const fn session(&self) -> &Session<B> {
        &self.session
    }

    /// Underlying session, mutably
    pub const fn session_mut(&mut self) -> &mut Session<B> {
        &mut self.session
    }

    /// Open the reader
    ///
    /// The device name is not used for selection; the configured vendor and
    /// product IDs always pick the device.
    pub fn create_channel_by_name(&mut self, lun: Lun, device_name: &str) -> ResponseCode {
        info!("lun: {lun:X}, device: {device_name}");
        match self.session.open() {
            Ok(()) => ResponseCode::Success,
            Err(e) => {
                warn!("Failed to open reader: {e}");
                ResponseCode::CommunicationError
            }
        }
    }

    /// Open the reader by channel number, which this reader does not support
    pub fn create_channel(&mut self, lun: Lun, channel: u32) -> ResponseCode {
        info!("lun: {lun:X}, channel: {channel}");
        ResponseCode::CommunicationError
    }

    /// Close the reader; closing a closed reader succeeds
    pub fn close_channel(&mut self, lun: Lun) -> ResponseCode {
        info!("lun: {lun:X}");
        self.session.close();
        ResponseCode::Success
    }

    /// Read a capability into `buffer`, returning the number of bytes written
    pub fn get_capabilities(&self, lun: Lun, tag: u32, buffer: &mut [u8]) -> IfdResult<usize> {
        info!("lun: {lun:X}, tag: {tag:#06X}");
        match Tag::try_from(tag) {
            Ok(Tag::SlotsNumber) => match buffer.first_mut() {
                Some(slot) => {
                    *slot = 1;
                    Ok(1)
                }
                None => Err(ResponseCode::ErrorInsufficientBuffer),
            },
            Ok(Tag::PollingThreadWithTimeout) => Ok(0),
            Ok(Tag::Atr) => match self.session.atr() {
                Some(atr) => atr
                    .copy_to(buffer)
                    .map_err(|_| ResponseCode::ErrorInsufficientBuffer),
                None => Ok(0),
            },
            Err(tag) => {
                debug!("Unknown tag {tag:#06X}");
                Err(ResponseCode::ErrorTag)
            }
        }
    }

    /// Set a capability, which is never supported
    pub fn set_capabilities(&mut self, lun: Lun, tag: u32, value: &[u8]) -> ResponseCode {
        info!("lun: {lun:X}, tag: {tag:#06X}, value: {}", hex::encode(value));
        ResponseCode::ErrorTag
    }

    /// Negotiate protocol parameters, which this reader does not support
    pub fn set_protocol_parameters(
        &mut self,
        lun: Lun,
        protocol: u32,
        flags: u8,
        pts: [u8; 3],
    ) -> ResponseCode {
        info!("lun: {lun:X}, protocol: T={protocol}, flags: {flags:#04X}, pts: {pts:02X?}");
        ResponseCode::CommunicationError
    }

    /// Apply a power action, copying any ATR into `atr`
    ///
    /// Returns the number of ATR bytes written, zero for power-down.
    pub fn power_icc(&mut self, lun: Lun, action: u32, atr: &mut [u8]) -> IfdResult<usize> {
        info!("lun: {lun:X}, action: {action}");
        let action = PowerAction::try_from(action).map_err(|code| {
            warn!("Unknown power action {code}");
            ResponseCode::NotSupported
        })?;

        self.session.power_card(action, atr).map_err(|e| {
            warn!("Power action {action:?} failed: {e}");
            power_error(&e)
        })
    }

    /// Send an APDU to the card, which this driver does not implement
    pub fn transmit_to_icc(
        &mut self,
        lun: Lun,
        command: &[u8],
        response: &mut [u8],
    ) -> IfdResult<usize> {
        info!(
            "lun: {lun:X}, command: {}, response capacity: {}",
            hex::encode(command),
            response.len()
        );
        Err(ResponseCode::ProtocolNotSupported)
    }

    /// Send a reader control command, which this reader does not implement
    pub fn control(&mut self, lun: Lun, command: &[u8], response: &mut [u8]) -> IfdResult<usize> {
        info!(
            "lun: {lun:X}, control: {}, response capacity: {}",
            hex::encode(command),
            response.len()
        );
        Err(ResponseCode::ErrorNotSupported)
    }

    /// Report whether a card is present
    pub fn icc_presence(&mut self, lun: Lun) -> ResponseCode {
        debug!("lun: {lun:X}");
        match self.session.presence() {
            Ok(Presence::Present) => ResponseCode::IccPresent,
            Ok(Presence::Absent) => ResponseCode::IccNotPresent,
            Err(e) => {
                warn!("Presence poll failed: {e}");
                ResponseCode::CommunicationError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, SimulatedReader};
    use crate::transport::TransportError;

    const LUN: Lun = 0;

    fn handler(reader: SimulatedReader) -> (MockBus, IfdHandler<MockBus>) {
        let bus = MockBus::new(reader);
        let handler = IfdHandler::new(bus.clone(), ReaderConfig::default());
        (bus, handler)
    }

    fn open(reader: SimulatedReader) -> (MockBus, IfdHandler<MockBus>) {
        let (bus, mut handler) = handler(reader);
        assert_eq!(
            handler.create_channel_by_name(LUN, "usb:0ca6/0010"),
            ResponseCode::Success
        );
        (bus, handler)
    }

    #[test]
    fn test_response_code_values() {
        assert_eq!(ResponseCode::Success.code(), 0);
        assert_eq!(ResponseCode::ErrorTag.code(), 600);
        assert_eq!(ResponseCode::ErrorPowerAction.code(), 608);
        assert_eq!(ResponseCode::CommunicationError.code(), 612);
        assert_eq!(ResponseCode::NotSupported.code(), 614);
        assert_eq!(u32::from(ResponseCode::IccPresent), 615);
        assert_eq!(u32::from(ResponseCode::IccNotPresent), 616);
        assert_eq!(u32::from(ResponseCode::ErrorInsufficientBuffer), 618);
    }

    #[test]
    fn test_power_action_codes() {
        assert_eq!(PowerAction::try_from(500), Ok(PowerAction::PowerUp));
        assert_eq!(PowerAction::try_from(501), Ok(PowerAction::PowerDown));
        assert_eq!(PowerAction::try_from(502), Ok(PowerAction::Reset));
        assert_eq!(PowerAction::try_from(503), Err(503));
    }

    #[test]
    fn test_create_channel() {
        let (bus, mut handler) = open(SimulatedReader::with_card());
        assert_eq!(
            handler.create_channel_by_name(LUN, "again"),
            ResponseCode::CommunicationError
        );
        assert_eq!(bus.open_handles(), 1);
        assert_eq!(
            handler.create_channel(LUN, 0x0001),
            ResponseCode::CommunicationError
        );
    }

    #[test]
    fn test_create_channel_without_device() {
        let (bus, mut handler) = handler(SimulatedReader::with_card());
        bus.reader().attached = false;
        assert_eq!(
            handler.create_channel_by_name(LUN, "usb:0ca6/0010"),
            ResponseCode::CommunicationError
        );
        assert!(!handler.session().is_open());
    }

    #[test]
    fn test_close_channel_idempotent() {
        let (bus, mut handler) = open(SimulatedReader::with_card());
        assert_eq!(handler.close_channel(LUN), ResponseCode::Success);
        assert_eq!(handler.close_channel(LUN), ResponseCode::Success);
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_slots_number() {
        let (_bus, handler) = handler(SimulatedReader::with_card());

        let mut one = [0u8; 1];
        assert_eq!(handler.get_capabilities(LUN, 0x0FAE, &mut one), Ok(1));
        assert_eq!(one, [1]);

        assert_eq!(
            handler.get_capabilities(LUN, 0x0FAE, &mut []),
            Err(ResponseCode::ErrorInsufficientBuffer)
        );
    }

    #[test]
    fn test_capability_tags() {
        let (_bus, handler) = handler(SimulatedReader::with_card());
        let mut buffer = [0u8; 8];
        assert_eq!(handler.get_capabilities(LUN, 0x0FB3, &mut buffer), Ok(0));
        assert_eq!(
            handler.get_capabilities(LUN, 0x0FAF, &mut buffer),
            Err(ResponseCode::ErrorTag)
        );
        // nothing cached yet
        assert_eq!(handler.get_capabilities(LUN, 0x0303, &mut buffer), Ok(0));
    }

    #[test]
    fn test_atr_capability_after_power_up() {
        let atr = [0x3b, 0x8f, 0x80, 0x01];
        let (_bus, mut handler) = open(SimulatedReader::with_card().with_atr(&atr));

        let mut buffer = [0u8; 33];
        assert_eq!(handler.power_icc(LUN, action::POWER_UP, &mut buffer), Ok(4));

        let mut cap = [0u8; 33];
        assert_eq!(handler.get_capabilities(LUN, 0x0303, &mut cap), Ok(4));
        assert_eq!(&cap[..4], &atr);
        assert_eq!(
            handler.get_capabilities(LUN, 0x0303, &mut [0u8; 3]),
            Err(ResponseCode::ErrorInsufficientBuffer)
        );
    }

    #[test]
    fn test_power_icc() {
        let atr = [0x3b, 0x02, 0x14, 0x50];
        let (_bus, mut handler) = open(SimulatedReader::with_card().with_atr(&atr));
        let mut buffer = [0u8; 33];

        assert_eq!(handler.power_icc(LUN, action::POWER_UP, &mut buffer), Ok(4));
        assert_eq!(&buffer[..4], &atr);
        assert_eq!(handler.power_icc(LUN, action::POWER_DOWN, &mut buffer), Ok(0));
        assert_eq!(handler.session().atr(), None);
        assert_eq!(
            handler.power_icc(LUN, action::RESET, &mut buffer),
            Err(ResponseCode::NotSupported)
        );
        assert_eq!(
            handler.power_icc(LUN, 999, &mut buffer),
            Err(ResponseCode::NotSupported)
        );
    }

    #[test]
    fn test_power_icc_small_buffer() {
        let (_bus, mut handler) = open(SimulatedReader::with_card().with_atr(&[0x3b, 0x00, 0x11]));
        let mut buffer = [0u8; 2];
        assert_eq!(
            handler.power_icc(LUN, action::POWER_UP, &mut buffer),
            Err(ResponseCode::ErrorPowerAction)
        );
        assert_eq!(buffer, [0, 0]);
    }

    #[test]
    fn test_power_icc_communication_errors() {
        let (bus, mut handler) = open(SimulatedReader::with_card());
        let mut buffer = [0u8; 33];

        bus.reader().fail_next_read = Some(TransportError::Timeout);
        assert_eq!(
            handler.power_icc(LUN, action::POWER_DOWN, &mut buffer),
            Err(ResponseCode::CommunicationError)
        );

        handler.close_channel(LUN);
        assert_eq!(
            handler.power_icc(LUN, action::POWER_UP, &mut buffer),
            Err(ResponseCode::CommunicationError)
        );
        assert_eq!(handler.icc_presence(LUN), ResponseCode::CommunicationError);
    }

    #[test]
    fn test_icc_presence() {
        let (bus, mut handler) = open(SimulatedReader::empty());
        assert_eq!(handler.icc_presence(LUN), ResponseCode::IccNotPresent);

        bus.reader().insert_card();
        assert_eq!(handler.icc_presence(LUN), ResponseCode::IccPresent);

        bus.reader().notify(&[0x50, 0x09]);
        assert_eq!(handler.icc_presence(LUN), ResponseCode::CommunicationError);
        assert_eq!(handler.icc_presence(LUN), ResponseCode::IccPresent);
    }

    #[test]
    fn test_unimplemented_entry_points() {
        let (bus, mut handler) = open(SimulatedReader::with_card());
        let sent = bus.sent_frames().len();
        let mut response = [0u8; 258];

        assert_eq!(
            handler.set_capabilities(LUN, 0x0FAE, &[1]),
            ResponseCode::ErrorTag
        );
        assert_eq!(
            handler.set_protocol_parameters(LUN, 1, 0, [0; 3]),
            ResponseCode::CommunicationError
        );
        assert_eq!(
            handler.transmit_to_icc(LUN, &[0x00, 0xa4, 0x04, 0x00], &mut response),
            Err(ResponseCode::ProtocolNotSupported)
        );
        assert_eq!(
            handler.control(LUN, &[0x20, 0x10], &mut response),
            Err(ResponseCode::ErrorNotSupported)
        );
        assert_eq!(bus.sent_frames().len(), sent);
    }
}
