//! Error types specific to the USB transport

use thiserror::Error;

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No device with the requested IDs is attached
    #[error("No USB device found matching {vendor_id:04x}:{product_id:04x}")]
    NotFound {
        /// Vendor ID that was searched for
        vendor_id: u16,
        /// Product ID that was searched for
        product_id: u16,
    },

    /// The transfer did not complete within its timeout
    #[error("Operation timed out")]
    Timeout,

    /// The device went away
    #[error("Device disconnected")]
    Disconnected,

    /// Any other USB stack failure
    #[error("USB error: {0}")]
    Usb(String),
}

impl TransportError {
    /// Create a general USB error
    pub fn usb<S: Into<String>>(message: S) -> Self {
        Self::Usb(message.into())
    }

    /// Check if this is a timeout
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<rusb::Error> for TransportError {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::NoDevice => Self::Disconnected,
            other => Self::Usb(other.to_string()),
        }
    }
}
