//! Core error type for reader operations
//!
//! Every failure is a single attempt and a single report: nothing in this
//! crate retries. The IFD layer folds these into response codes, see
//! [`crate::ifd::ResponseCode`].

use crate::transport::TransportError;

/// Result type for reader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for reader operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// USB transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No channel has been opened
    #[error("No reader channel is open")]
    NoChannel,

    /// A channel is already open and must be closed first
    #[error("A reader channel is already open")]
    AlreadyOpen,

    /// A transfer moved fewer bytes than the protocol requires
    #[error("Short transfer: expected {expected} bytes, transferred {actual}")]
    ShortTransfer {
        /// Required byte count
        expected: usize,
        /// Bytes actually transferred
        actual: usize,
    },

    /// Response header does not carry the data block marker and a short length
    #[error("Malformed response header: {}", hex::encode(.0))]
    MalformedHeader([u8; 5]),

    /// Declared ATR length is zero or exceeds the maximum ATR size
    #[error("Invalid ATR length byte: {0}")]
    InvalidAtrLength(u8),

    /// Interrupt endpoint delivered something other than a presence notification
    #[error("Unexpected notification: {}", hex::encode(.0))]
    UnexpectedNotification(Vec<u8>),

    /// Caller-supplied buffer cannot hold the result
    #[error("Buffer too small: need {required} bytes, have {available}")]
    InsufficientBuffer {
        /// Bytes needed
        required: usize,
        /// Capacity offered by the caller
        available: usize,
    },

    /// Operation is not implemented by this reader
    #[error("Not supported: {0}")]
    NotSupported(&'static str),
}

impl Error {
    /// Check if this error belongs to the communication error family
    ///
    /// Capacity violations and unsupported operations are not communication errors.
    pub const fn is_communication_error(&self) -> bool {
        !matches!(
            self,
            Self::InsufficientBuffer { .. } | Self::NotSupported(_)
        )
    }
}
