//! Transport traits for USB communication with the reader
//!
//! The protocol engine never touches the USB stack directly. It talks to a
//! [`UsbDevice`] obtained from a [`UsbBus`], which lets the same engine run
//! against real hardware through [`RusbBus`] or against the in-memory
//! simulated reader in [`crate::mock`].
//!
//! All transfers are blocking with a caller-supplied timeout. A timeout is
//! reported as [`TransportError::Timeout`] and it is up to the caller to
//! decide whether that is fatal. No retries are performed at this layer.

pub mod error;
mod usb;

use std::{fmt, time::Duration};

pub use error::TransportError;

use crate::config::ReaderConfig;
pub use usb::{RusbBus, RusbDevice};

/// An open connection to one USB device
///
/// Dropping the value closes the connection.
pub trait UsbDevice: Send + fmt::Debug {
    /// Write `data` to a bulk OUT endpoint, returning the number of bytes transferred
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Read from a bulk IN endpoint into `buffer`, returning the number of bytes received
    fn read_bulk(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Read from an interrupt IN endpoint into `buffer`, returning the number of bytes received
    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;
}

/// Source of device connections
pub trait UsbBus: fmt::Debug {
    /// Connection type produced by this bus
    type Device: UsbDevice;

    /// Open the first device matching the configured vendor and product IDs
    ///
    /// If the configuration names an interface, it is claimed before the
    /// device is returned and released when the device is dropped.
    fn open(&self, config: &ReaderConfig) -> Result<Self::Device, TransportError>;
}

impl<D: UsbDevice + ?Sized> UsbDevice for Box<D> {
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).write_bulk(endpoint, data, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).read_bulk(endpoint, buffer, timeout)
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).read_interrupt(endpoint, buffer, timeout)
    }
}
