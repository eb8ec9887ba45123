//! In-memory simulated reader
//!
//! [`MockBus`] opens [`MockDevice`]s that all talk to one shared
//! [`SimulatedReader`]. The reader answers command codes the way the
//! EZ100PU does, records every outbound frame, and lets callers inject
//! failures, scripted responses and interrupt notifications.

use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use parking_lot::{Mutex, MutexGuard};

use crate::{
    codec::CommandCode,
    config::ReaderConfig,
    constants::{EZ100PU_PID, EZ100PU_VID, notification, response},
    transport::{TransportError, UsbBus, UsbDevice},
};

/// ATR reported by a default simulated card
pub const DEFAULT_ATR: &[u8] = &[
    0x3b, 0xbe, 0x11, 0x00, 0x00, 0x41, 0x01, 0x38, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x90, 0x00,
];

/// Description reported by the simulated reader in status responses
pub const DEFAULT_DESCRIPTION: &str = "EZ100PU Simulated Reader";

/// State of the simulated reader shared by the bus and its devices
#[derive(Debug, Clone)]
pub struct SimulatedReader {
    /// Vendor ID the reader enumerates with
    pub vendor_id: u16,
    /// Product ID the reader enumerates with
    pub product_id: u16,
    /// Whether the reader is plugged in
    pub attached: bool,
    /// Whether a card sits in the slot
    pub card_present: bool,
    /// Whether the card is currently powered
    pub powered: bool,
    /// ATR returned on power-up
    pub atr: Vec<u8>,
    /// Human-readable text appended to status responses
    pub description: String,
    /// Every command frame written so far
    pub sent: Vec<Vec<u8>>,
    /// Responses returned instead of the computed answer, oldest first
    pub scripted: VecDeque<Vec<u8>>,
    /// Notifications waiting on the interrupt endpoint
    pub notifications: VecDeque<Vec<u8>>,
    /// Report only this many bytes written on the next command
    pub short_write: Option<usize>,
    /// Fail the next bulk write
    pub fail_next_write: Option<TransportError>,
    /// Fail the next bulk read
    pub fail_next_read: Option<TransportError>,
    /// Fail the next interrupt read
    pub fail_next_interrupt: Option<TransportError>,
    /// Number of device handles currently open
    pub open_handles: usize,
    /// Interface claimed by the last open, cleared when the device is dropped
    pub claimed: Option<u8>,
    pending: Option<Vec<u8>>,
}

impl Default for SimulatedReader {
    fn default() -> Self {
        Self {
            vendor_id: EZ100PU_VID,
            product_id: EZ100PU_PID,
            attached: true,
            card_present: false,
            powered: false,
            atr: DEFAULT_ATR.to_vec(),
            description: DEFAULT_DESCRIPTION.to_string(),
            sent: Vec::new(),
            scripted: VecDeque::new(),
            notifications: VecDeque::new(),
            short_write: None,
            fail_next_write: None,
            fail_next_read: None,
            fail_next_interrupt: None,
            open_handles: 0,
            claimed: None,
            pending: None,
        }
    }
}

impl SimulatedReader {
    /// Reader with an empty slot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reader with the default card inserted
    pub fn with_card() -> Self {
        Self {
            card_present: true,
            ..Self::default()
        }
    }

    /// Answer to different USB IDs
    pub const fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Replace the card's ATR
    pub fn with_atr(mut self, atr: &[u8]) -> Self {
        self.atr = atr.to_vec();
        self
    }

    /// Queue a raw interrupt notification
    pub fn notify(&mut self, bytes: &[u8]) {
        self.notifications.push_back(bytes.to_vec());
    }

    /// Insert a card and raise the matching notification
    pub fn insert_card(&mut self) {
        self.card_present = true;
        self.notify(&[notification::MARKER, notification::INSERTED]);
    }

    /// Remove the card and raise the matching notification
    pub fn remove_card(&mut self) {
        self.card_present = false;
        self.powered = false;
        self.notify(&[notification::MARKER, notification::REMOVED]);
    }

    /// Return `bytes` as the response to the next command
    pub fn script_response(&mut self, bytes: &[u8]) {
        self.scripted.push_back(bytes.to_vec());
    }

    /// Command codes of every frame written so far
    pub fn sent_codes(&self) -> Vec<u8> {
        self.sent.iter().filter_map(|f| f.first().copied()).collect()
    }

    const fn slot_status(&self) -> u8 {
        match (self.card_present, self.powered) {
            (true, true) => response::SLOT_CARD_ACTIVE,
            (true, false) => response::SLOT_CARD_INACTIVE,
            (false, _) => response::SLOT_EMPTY,
        }
    }

    fn header(&self, marker: u8, len: u32, seq: u8) -> Vec<u8> {
        let mut frame = vec![0u8; response::PAYLOAD_OFFSET];
        frame[0] = marker;
        frame[1..5].copy_from_slice(&len.to_le_bytes());
        frame[6] = seq;
        frame[response::STATUS_OFFSET] = self.slot_status();
        frame
    }

    fn answer(&mut self, frame: &[u8]) -> Vec<u8> {
        if let Some(scripted) = self.scripted.pop_front() {
            return scripted;
        }

        let seq = frame.get(6).copied().unwrap_or_default();
        match frame.first().copied().map(CommandCode::try_from) {
            Some(Ok(CommandCode::StatusQuery)) => {
                let text = self.description.clone().into_bytes();
                let mut out = self.header(0x81, text.len() as u32, seq);
                out.extend_from_slice(&text);
                out
            }
            Some(Ok(CommandCode::PowerDown)) => {
                self.powered = false;
                self.header(0x81, 0, seq)
            }
            Some(Ok(CommandCode::PowerUp)) if self.card_present => {
                self.powered = true;
                atr_response(&self.atr, seq)
            }
            // mute slot
            _ => {
                let mut out = self.header(0x81, 0, seq);
                out[8] = 0xfe;
                out
            }
        }
    }
}

/// Build a well-formed power-up response carrying `atr`
pub fn atr_response(atr: &[u8], seq: u8) -> Vec<u8> {
    let declared = atr.len() + 1;
    let mut out = vec![0u8; response::ATR_OFFSET];
    out[0] = response::DATA_BLOCK_MARKER;
    out[response::LENGTH_OFFSET] = declared as u8;
    out[6] = seq;
    out[response::PAYLOAD_OFFSET] = atr.len() as u8;
    out.extend_from_slice(atr);
    out
}

/// Bus handing out devices connected to a shared [`SimulatedReader`]
#[derive(Debug, Clone)]
pub struct MockBus {
    reader: Arc<Mutex<SimulatedReader>>,
}

impl MockBus {
    /// Create a bus around a simulated reader
    pub fn new(reader: SimulatedReader) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
        }
    }

    /// Lock the simulated reader for inspection or fault injection
    pub fn reader(&self) -> MutexGuard<'_, SimulatedReader> {
        self.reader.lock()
    }

    /// Every command frame written so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.reader.lock().sent.clone()
    }

    /// Number of device handles currently open
    pub fn open_handles(&self) -> usize {
        self.reader.lock().open_handles
    }
}

impl UsbBus for MockBus {
    type Device = MockDevice;

    fn open(&self, config: &ReaderConfig) -> Result<MockDevice, TransportError> {
        let (vendor_id, product_id) = (config.vendor_id, config.product_id);
        let mut reader = self.reader.lock();
        if !reader.attached || reader.vendor_id != vendor_id || reader.product_id != product_id {
            return Err(TransportError::NotFound {
                vendor_id,
                product_id,
            });
        }
        reader.open_handles += 1;
        reader.claimed = config.interface;
        Ok(MockDevice {
            reader: Arc::clone(&self.reader),
        })
    }
}

/// Device handle connected to a [`SimulatedReader`]
pub struct MockDevice {
    reader: Arc<Mutex<SimulatedReader>>,
}

impl fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDevice").finish_non_exhaustive()
    }
}

impl UsbDevice for MockDevice {
    fn write_bulk(
        &mut self,
        _endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut reader = self.reader.lock();
        if !reader.attached {
            return Err(TransportError::Disconnected);
        }
        if let Some(e) = reader.fail_next_write.take() {
            return Err(e);
        }
        reader.sent.push(data.to_vec());
        if let Some(n) = reader.short_write.take() {
            return Ok(n);
        }
        let answer = reader.answer(data);
        reader.pending = Some(answer);
        Ok(data.len())
    }

    fn read_bulk(
        &mut self,
        _endpoint: u8,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut reader = self.reader.lock();
        if !reader.attached {
            return Err(TransportError::Disconnected);
        }
        if let Some(e) = reader.fail_next_read.take() {
            return Err(e);
        }
        let Some(answer) = reader.pending.take() else {
            return Err(TransportError::Timeout);
        };
        let n = answer.len().min(buffer.len());
        buffer[..n].copy_from_slice(&answer[..n]);
        Ok(n)
    }

    fn read_interrupt(
        &mut self,
        _endpoint: u8,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut reader = self.reader.lock();
        if !reader.attached {
            return Err(TransportError::Disconnected);
        }
        if let Some(e) = reader.fail_next_interrupt.take() {
            return Err(e);
        }
        let Some(bytes) = reader.notifications.pop_front() else {
            return Err(TransportError::Timeout);
        };
        let n = bytes.len().min(buffer.len());
        buffer[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let mut reader = self.reader.lock();
        reader.open_handles = reader.open_handles.saturating_sub(1);
        reader.claimed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_matching_ids() {
        let bus = MockBus::new(SimulatedReader::empty());
        assert!(matches!(
            bus.open(&ReaderConfig::new().with_ids(0x1234, EZ100PU_PID)),
            Err(TransportError::NotFound { .. })
        ));

        let device = bus.open(&ReaderConfig::default()).unwrap();
        assert_eq!(bus.open_handles(), 1);
        drop(device);
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_open_claims_configured_interface() {
        let bus = MockBus::new(SimulatedReader::empty().with_ids(0x0ca6, 0x0011));
        let config = ReaderConfig::new().with_ids(0x0ca6, 0x0011);

        let device = bus.open(&config).unwrap();
        assert_eq!(bus.reader().claimed, None);
        drop(device);

        let device = bus.open(&config.with_interface(Some(0))).unwrap();
        assert_eq!(bus.reader().claimed, Some(0));
        drop(device);
        assert_eq!(bus.reader().claimed, None);
    }

    #[test]
    fn test_atr_response_layout() {
        let frame = atr_response(&[0x3b, 0x02, 0x14], 9);
        assert_eq!(
            frame,
            vec![0x80, 0, 0, 0, 4, 0, 9, 0, 0, 0, 3, 0x3b, 0x02, 0x14]
        );
    }

    #[test]
    fn test_power_up_without_card_is_mute() {
        let bus = MockBus::new(SimulatedReader::empty());
        let mut device = bus.open(&ReaderConfig::default()).unwrap();
        let timeout = Duration::from_millis(1);

        device
            .write_bulk(0x01, &[0x62, 0, 0, 0, 0, 0, 0, 0, 0, 0], timeout)
            .unwrap();
        let mut buffer = [0u8; 64];
        let n = device.read_bulk(0x82, &mut buffer, timeout).unwrap();
        assert_eq!(n, 10);
        assert_ne!(buffer[0], 0x80);
    }
}
