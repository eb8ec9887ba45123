//! Card power state machine
//!
//! The card is either [`PowerState::Unpowered`] or [`PowerState::Powered`]
//! holding the ATR it answered with. Power-up always cycles the card
//! through a power-down first, the reader does not answer a bare power-up
//! reliably.

use tracing::{debug, warn};

use crate::{
    atr::Atr,
    codec::{CommandCode, Pipe, ResponseFrame},
    constants::{MAX_ATR_SIZE, response},
    error::{Error, Result},
    transport::UsbDevice,
};

/// Power actions the middleware can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Power up the card and read its ATR
    PowerUp,
    /// Power down the card
    PowerDown,
    /// Warm reset
    Reset,
}

/// Current power state of the card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PowerState {
    /// No valid ATR is cached
    #[default]
    Unpowered,
    /// Card is powered and answered with this ATR
    Powered(Atr),
}

impl PowerState {
    /// Cached ATR, if powered
    pub const fn atr(&self) -> Option<&Atr> {
        match self {
            Self::Powered(atr) => Some(atr),
            Self::Unpowered => None,
        }
    }

    /// Whether the card is powered
    pub const fn is_powered(&self) -> bool {
        matches!(self, Self::Powered(_))
    }
}

/// Validate a power-up response and extract the ATR
///
/// Byte 0 must be the data block marker and bytes 1..4 zero (payload
/// shorter than 256). Byte 4 declares the payload length, one length byte
/// plus the ATR, and must be between 1 and [`MAX_ATR_SIZE`]. The ATR
/// starts at offset 11.
pub fn parse_atr_response(frame: &ResponseFrame) -> Result<Atr> {
    let bytes = frame.as_bytes();
    let mut header = [0u8; 5];
    let available = bytes.len().min(header.len());
    header[..available].copy_from_slice(&bytes[..available]);

    if available < header.len()
        || header[0] != response::DATA_BLOCK_MARKER
        || header[1..4] != [0, 0, 0]
    {
        return Err(Error::MalformedHeader(header));
    }

    let declared = header[response::LENGTH_OFFSET];
    if declared == 0 || usize::from(declared) > MAX_ATR_SIZE {
        return Err(Error::InvalidAtrLength(declared));
    }

    let atr_len = usize::from(declared) - 1;
    let end = response::ATR_OFFSET + atr_len;
    if bytes.len() < end {
        return Err(Error::ShortTransfer {
            expected: end,
            actual: bytes.len(),
        });
    }

    Atr::from_slice(&bytes[response::ATR_OFFSET..end])
}

/// Drives power transitions over a [`Pipe`]
#[derive(Debug, Default, Clone)]
pub struct PowerMachine {
    state: PowerState,
}

impl PowerMachine {
    /// Start unpowered
    pub const fn new() -> Self {
        Self {
            state: PowerState::Unpowered,
        }
    }

    /// Current state
    pub const fn state(&self) -> &PowerState {
        &self.state
    }

    /// Cached ATR, if powered
    pub const fn atr(&self) -> Option<&Atr> {
        self.state.atr()
    }

    /// Forget the cached ATR
    pub fn invalidate(&mut self) {
        self.state = PowerState::Unpowered;
    }

    /// Cycle the card down and up, caching the ATR on success
    ///
    /// Any transfer or validation failure leaves the machine unpowered with
    /// no ATR cached.
    pub fn power_up<D: UsbDevice>(&mut self, pipe: &mut Pipe<D>) -> Result<Atr> {
        self.state = PowerState::Unpowered;

        pipe.send_receive(CommandCode::PowerDown)?;
        let frame = pipe.send_receive(CommandCode::PowerUp)?;

        let atr = parse_atr_response(&frame).inspect_err(|e| {
            warn!("Power up rejected: {e}");
        })?;
        debug!("Card powered, ATR {atr}");

        self.state = PowerState::Powered(atr.clone());
        Ok(atr)
    }

    /// Power the card down
    ///
    /// The cached ATR is dropped whether or not the transfer succeeds.
    pub fn power_down<D: UsbDevice>(&mut self, pipe: &mut Pipe<D>) -> Result<()> {
        self.state = PowerState::Unpowered;
        pipe.send_receive(CommandCode::PowerDown)?;
        debug!("Card powered down");
        Ok(())
    }
}
