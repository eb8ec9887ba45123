//! Shared helpers for the integration tests
#![allow(dead_code)]

use ezifd::{
    IfdHandler, ReaderConfig, Session,
    mock::{MockBus, SimulatedReader},
};

/// ATR used by the scenario tests
pub(crate) const TEST_ATR: [u8; 11] = [
    0x3b, 0x8a, 0x80, 0x01, 0x00, 0x31, 0xc1, 0x73, 0xc8, 0x40, 0x00,
];

/// Closed session over a simulated reader
pub(crate) fn session(reader: SimulatedReader) -> (MockBus, Session<MockBus>) {
    let bus = MockBus::new(reader);
    let session = Session::new(bus.clone(), ReaderConfig::default());
    (bus, session)
}

/// Open handler over a simulated reader holding the test card
pub(crate) fn open_handler() -> (MockBus, IfdHandler<MockBus>) {
    let bus = MockBus::new(SimulatedReader::with_card().with_atr(&TEST_ATR));
    let mut handler = IfdHandler::new(bus.clone(), ReaderConfig::default());
    assert!(handler.create_channel_by_name(0, "EZ100PU").is_success());
    (bus, handler)
}

/// Sequence byte of every command frame written so far
pub(crate) fn sequences(bus: &MockBus) -> Vec<u8> {
    bus.sent_frames().iter().map(|frame| frame[6]).collect()
}
