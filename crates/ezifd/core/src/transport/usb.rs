//! libusb transport implementation

use std::{fmt, time::Duration};

use rusb::{Context, DeviceHandle, UsbContext};
use tracing::{debug, warn};

use super::{TransportError, UsbBus, UsbDevice};
use crate::config::ReaderConfig;

/// Bus implementation backed by a libusb context
pub struct RusbBus {
    /// libusb context
    context: Context,
}

impl fmt::Debug for RusbBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusbBus").finish_non_exhaustive()
    }
}

impl RusbBus {
    /// Initialise a new libusb context
    pub fn new() -> Result<Self, TransportError> {
        let context = Context::new()?;
        Ok(Self { context })
    }
}

impl UsbBus for RusbBus {
    type Device = RusbDevice;

    fn open(&self, config: &ReaderConfig) -> Result<RusbDevice, TransportError> {
        let (vendor_id, product_id) = (config.vendor_id, config.product_id);
        let Some(handle) = self.context.open_device_with_vid_pid(vendor_id, product_id) else {
            return Err(TransportError::NotFound {
                vendor_id,
                product_id,
            });
        };
        debug!("Opened USB device {vendor_id:04x}:{product_id:04x}");

        let Some(interface) = config.interface else {
            return Ok(RusbDevice {
                handle,
                claimed: None,
            });
        };

        // Detach kernel driver if necessary (Linux)
        #[cfg(target_os = "linux")]
        {
            if handle.kernel_driver_active(interface).unwrap_or(false) {
                handle.detach_kernel_driver(interface)?;
            }
        }

        handle.claim_interface(interface)?;
        debug!("Claimed interface {interface}");

        Ok(RusbDevice {
            handle,
            claimed: Some(interface),
        })
    }
}

/// An open libusb device handle
pub struct RusbDevice {
    /// USB device handle
    handle: DeviceHandle<Context>,
    /// The interface we claimed, released on drop
    claimed: Option<u8>,
}

impl fmt::Debug for RusbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusbDevice")
            .field("claimed", &self.claimed)
            .finish()
    }
}

impl UsbDevice for RusbDevice {
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        Ok(self.handle.write_bulk(endpoint, data, timeout)?)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        Ok(self.handle.read_bulk(endpoint, buffer, timeout)?)
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        Ok(self.handle.read_interrupt(endpoint, buffer, timeout)?)
    }
}

impl Drop for RusbDevice {
    fn drop(&mut self) {
        if let Some(interface) = self.claimed.take() {
            if let Err(e) = self.handle.release_interface(interface) {
                warn!("Failed to release interface {interface}: {e}");
            }
        }
    }
}
