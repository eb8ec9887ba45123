//! Bulk command/response framing
//!
//! Every exchange with the reader is a fixed 10-byte command frame on the
//! bulk OUT endpoint followed by one read of up to 256 bytes on the bulk IN
//! endpoint. The protocol is half-duplex, so a [`Pipe`] owns the device and
//! the sequence counter together and hands out one exchange at a time.
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Command code
//! 1       4     Payload length (always 0, no payload is sent)
//! 5       1     Slot index (always 0)
//! 6       1     Sequence number
//! 7       3     Reserved
//! ```

use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    config::ReaderConfig,
    constants::{COMMAND_FRAME_LEN, INTERRUPT_BUFFER_LEN, RESPONSE_BUFFER_LEN, SLOT_INDEX},
    error::{Error, Result},
    observer::{Direction, FrameObserver, FrameTrace},
    transport::{TransportError, UsbDevice},
};

/// Command codes understood by the reader
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    /// Query slot status and reader description
    StatusQuery = 0x60,
    /// Power up (or reset) the card
    PowerUp = 0x62,
    /// Power down the card
    PowerDown = 0x63,
}

impl From<CommandCode> for u8 {
    fn from(code: CommandCode) -> Self {
        code as Self
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = u8;

    fn try_from(byte: u8) -> std::result::Result<Self, u8> {
        match byte {
            0x60 => Ok(Self::StatusQuery),
            0x62 => Ok(Self::PowerUp),
            0x63 => Ok(Self::PowerDown),
            other => Err(other),
        }
    }
}

/// 8-bit sequence number carried in every command frame
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter(u8);

impl SequenceCounter {
    /// Counter starting at zero
    pub const fn new() -> Self {
        Self(0)
    }

    /// Value the next frame will carry
    pub const fn peek(&self) -> u8 {
        self.0
    }

    /// Take the current value and advance, wrapping at 256
    pub const fn next(&mut self) -> u8 {
        let seq = self.0;
        self.0 = self.0.wrapping_add(1);
        seq
    }
}

/// Outbound 10-byte command frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame([u8; COMMAND_FRAME_LEN]);

impl CommandFrame {
    /// Encode a command with the given sequence number
    pub const fn encode(code: CommandCode, sequence: u8) -> Self {
        let mut frame = [0u8; COMMAND_FRAME_LEN];
        frame[0] = code as u8;
        // bytes 1..5: payload length, always zero
        frame[5] = SLOT_INDEX;
        frame[6] = sequence;
        Self(frame)
    }

    /// Command code byte
    pub const fn code(&self) -> u8 {
        self.0[0]
    }

    /// Sequence number
    pub const fn sequence(&self) -> u8 {
        self.0[6]
    }

    /// Raw frame bytes
    pub const fn as_bytes(&self) -> &[u8; COMMAND_FRAME_LEN] {
        &self.0
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFrame")
            .field("code", &format_args!("{:#04x}", self.code()))
            .field("seq", &self.sequence())
            .finish()
    }
}

/// Inbound response frame
#[derive(Clone)]
pub struct ResponseFrame {
    buffer: [u8; RESPONSE_BUFFER_LEN],
    len: usize,
}

impl ResponseFrame {
    /// Build a response frame from received bytes, truncating at the buffer size
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(RESPONSE_BUFFER_LEN);
        let mut buffer = [0u8; RESPONSE_BUFFER_LEN];
        buffer[..len].copy_from_slice(&bytes[..len]);
        Self { buffer, len }
    }

    /// Bytes actually received
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Number of bytes received
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing was received
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte at `offset`, if it was received
    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.as_bytes().get(offset).copied()
    }
}

impl fmt::Debug for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFrame")
            .field("len", &self.len)
            .field("data", &format_args!("{}", hex::encode(self.as_bytes())))
            .finish()
    }
}

/// Owned device plus the sequencing and tracing needed to exchange frames
pub struct Pipe<D> {
    /// USB device
    device: D,
    /// Sequence counter, reset on every new pipe
    sequence: SequenceCounter,
    /// Endpoints and timeouts
    config: ReaderConfig,
    /// Diagnostic frame observer
    observer: Arc<dyn FrameObserver>,
}

impl<D: fmt::Debug> fmt::Debug for Pipe<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("device", &self.device)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl<D: UsbDevice> Pipe<D> {
    /// Wrap a freshly opened device; the sequence counter starts at zero
    pub fn new(device: D, config: ReaderConfig, observer: Arc<dyn FrameObserver>) -> Self {
        Self {
            device,
            sequence: SequenceCounter::new(),
            config,
            observer,
        }
    }

    /// Sequence number the next command will carry
    pub const fn next_sequence(&self) -> u8 {
        self.sequence.peek()
    }

    /// Send a command frame and read the response
    ///
    /// The sequence counter advances even if the transfer fails. Anything
    /// other than exactly 10 bytes written is a short transfer. A timeout on
    /// either leg is a hard error.
    pub fn send_receive(&mut self, code: CommandCode) -> Result<ResponseFrame> {
        let frame = CommandFrame::encode(code, self.sequence.next());
        let command = Some(u8::from(code));

        let written = self.device.write_bulk(
            self.config.command_endpoint,
            frame.as_bytes(),
            self.config.bulk_timeout,
        );
        let sent = match &written {
            Ok(n) => &frame.as_bytes()[..(*n).min(COMMAND_FRAME_LEN)],
            Err(_) => &[][..],
        };
        self.observer.on_frame(&FrameTrace {
            direction: Direction::Out,
            command,
            result: written.as_ref().copied(),
            bytes: sent,
        });
        let written = written?;
        if written != COMMAND_FRAME_LEN {
            return Err(Error::ShortTransfer {
                expected: COMMAND_FRAME_LEN,
                actual: written,
            });
        }

        let mut buffer = [0u8; RESPONSE_BUFFER_LEN];
        let received = self.device.read_bulk(
            self.config.response_endpoint,
            &mut buffer,
            self.config.bulk_timeout,
        );
        let len = match &received {
            Ok(n) => (*n).min(RESPONSE_BUFFER_LEN),
            Err(_) => 0,
        };
        self.observer.on_frame(&FrameTrace {
            direction: Direction::In,
            command,
            result: received.as_ref().copied(),
            bytes: &buffer[..len],
        });
        received?;

        Ok(ResponseFrame { buffer, len })
    }

    /// Poll the interrupt endpoint once
    ///
    /// Returns `Ok(None)` when the poll times out, which means nothing
    /// happened. Timeouts are not reported to the observer.
    pub fn poll_interrupt(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buffer = [0u8; INTERRUPT_BUFFER_LEN];
        let received = self.device.read_interrupt(
            self.config.interrupt_endpoint,
            &mut buffer,
            self.config.poll_timeout,
        );

        match received {
            Err(TransportError::Timeout) => Ok(None),
            Err(e) => {
                self.observer.on_frame(&FrameTrace {
                    direction: Direction::Interrupt,
                    command: None,
                    result: Err(&e),
                    bytes: &[],
                });
                debug!("Interrupt poll failed: {e}");
                Err(e.into())
            }
            Ok(n) => {
                let n = n.min(INTERRUPT_BUFFER_LEN);
                self.observer.on_frame(&FrameTrace {
                    direction: Direction::Interrupt,
                    command: None,
                    result: Ok(n),
                    bytes: &buffer[..n],
                });
                Ok(Some(buffer[..n].to_vec()))
            }
        }
    }
}
