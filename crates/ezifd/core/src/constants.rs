//! Wire-level constants for the EZ100PU reader protocol

use std::time::Duration;

/// EZ100PU USB vendor ID
pub const EZ100PU_VID: u16 = 0x0ca6;

/// EZ100PU USB product ID
pub const EZ100PU_PID: u16 = 0x0010;

/// Endpoint addresses used by the reader
pub mod endpoint {
    /// Bulk OUT endpoint carrying command frames
    pub const COMMAND: u8 = 0x01;
    /// Bulk IN endpoint carrying response frames
    pub const RESPONSE: u8 = 0x82;
    /// Interrupt IN endpoint carrying card presence notifications
    pub const INTERRUPT: u8 = 0x83;
}

/// Timeout applied to each bulk transfer
pub const BULK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeout applied to interrupt polls, short enough to never stall the caller
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Length of every outbound command frame
pub const COMMAND_FRAME_LEN: usize = 10;

/// Size of the buffer inbound response frames are read into
pub const RESPONSE_BUFFER_LEN: usize = 256;

/// Size of the buffer interrupt notifications are read into
pub const INTERRUPT_BUFFER_LEN: usize = 8;

/// Maximum ATR length accepted from the reader, in bytes
pub const MAX_ATR_SIZE: usize = 33;

/// Slot index carried in every command frame; the reader has a single slot
pub const SLOT_INDEX: u8 = 0;

/// Response frame layout
pub mod response {
    /// Marker byte of a data block response
    pub const DATA_BLOCK_MARKER: u8 = 0x80;
    /// Offset of the declared payload length byte
    pub const LENGTH_OFFSET: usize = 4;
    /// Offset of the payload (one length byte precedes the ATR)
    pub const PAYLOAD_OFFSET: usize = 10;
    /// Offset of the first ATR byte in a power-up response
    pub const ATR_OFFSET: usize = 11;
    /// Offset of the card status byte in a status-query response
    pub const STATUS_OFFSET: usize = 7;
    /// Bits of the status byte carrying the slot state
    pub const SLOT_STATE_MASK: u8 = 0x03;
    /// Slot state: card inserted and powered
    pub const SLOT_CARD_ACTIVE: u8 = 0x00;
    /// Slot state: card inserted, not powered
    pub const SLOT_CARD_INACTIVE: u8 = 0x01;
    /// Slot state: no card
    pub const SLOT_EMPTY: u8 = 0x02;
    /// Minimum length of a status-query response
    pub const MIN_STATUS_LEN: usize = 10;
}

/// Interrupt notification layout
pub mod notification {
    /// Length of a presence notification
    pub const LEN: usize = 2;
    /// Marker byte of a presence notification
    pub const MARKER: u8 = 0x50;
    /// Card removed
    pub const REMOVED: u8 = 0x02;
    /// Card inserted
    pub const INSERTED: u8 = 0x03;
}
