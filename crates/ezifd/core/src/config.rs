//! Configuration options for the reader

use std::time::Duration;

use crate::constants::{BULK_TIMEOUT, EZ100PU_PID, EZ100PU_VID, POLL_TIMEOUT, endpoint};

/// Configuration options for a reader session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// USB vendor ID to match
    pub vendor_id: u16,

    /// USB product ID to match
    pub product_id: u16,

    /// Bulk OUT endpoint for command frames
    pub command_endpoint: u8,

    /// Bulk IN endpoint for response frames
    pub response_endpoint: u8,

    /// Interrupt IN endpoint for presence notifications
    pub interrupt_endpoint: u8,

    /// Timeout for each bulk transfer
    pub bulk_timeout: Duration,

    /// Timeout for each interrupt poll
    pub poll_timeout: Duration,

    /// Interface to claim after opening, if any
    pub interface: Option<u8>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            vendor_id: EZ100PU_VID,
            product_id: EZ100PU_PID,
            command_endpoint: endpoint::COMMAND,
            response_endpoint: endpoint::RESPONSE,
            interrupt_endpoint: endpoint::INTERRUPT,
            bulk_timeout: BULK_TIMEOUT,
            poll_timeout: POLL_TIMEOUT,
            interface: None,
        }
    }
}

impl ReaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the USB vendor and product IDs
    pub const fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Set the command, response and interrupt endpoints
    pub const fn with_endpoints(mut self, command: u8, response: u8, interrupt: u8) -> Self {
        self.command_endpoint = command;
        self.response_endpoint = response;
        self.interrupt_endpoint = interrupt;
        self
    }

    /// Set the bulk transfer timeout
    pub const fn with_bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    /// Set the interrupt poll timeout
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the interface to claim
    pub const fn with_interface(mut self, interface: Option<u8>) -> Self {
        self.interface = interface;
        self
    }
}
