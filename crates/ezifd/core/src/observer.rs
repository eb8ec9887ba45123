//! Frame observers
//!
//! Diagnostic tracing of the frames exchanged with the reader is kept out of
//! the protocol code: the [`Pipe`](crate::codec::Pipe) reports each transfer
//! to a [`FrameObserver`], and the default [`TracingObserver`] turns it into
//! a `trace!` record with a hexdump of the bytes.

use std::fmt;

use tracing::trace;

use crate::transport::TransportError;

/// Which way a frame travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Command frame written to the bulk OUT endpoint
    Out,
    /// Response frame read from the bulk IN endpoint
    In,
    /// Notification read from the interrupt endpoint
    Interrupt,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Out => write!(f, "out"),
            Self::In => write!(f, "in"),
            Self::Interrupt => write!(f, "irq"),
        }
    }
}

/// One observed transfer
#[derive(Debug, Clone, Copy)]
pub struct FrameTrace<'a> {
    /// Transfer direction
    pub direction: Direction,
    /// Command code of the exchange, absent for interrupt polls
    pub command: Option<u8>,
    /// Transfer outcome
    pub result: Result<usize, &'a TransportError>,
    /// Bytes actually transferred
    pub bytes: &'a [u8],
}

/// Receives every frame exchanged with the reader
pub trait FrameObserver: Send + Sync {
    /// Observe a transfer
    fn on_frame(&self, frame: &FrameTrace<'_>);
}

// Implement observers for closures
impl<F> FrameObserver for F
where
    F: Fn(&FrameTrace<'_>) + Send + Sync,
{
    fn on_frame(&self, frame: &FrameTrace<'_>) {
        self(frame)
    }
}

/// Observer emitting a `trace!` record per frame
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FrameObserver for TracingObserver {
    fn on_frame(&self, frame: &FrameTrace<'_>) {
        let dump = hexdump(frame.bytes);
        match (frame.command, frame.result) {
            (Some(code), Ok(n)) => {
                trace!("{} {code:02x} ok {n} ({dump})", frame.direction)
            }
            (Some(code), Err(e)) => {
                trace!("{} {code:02x} failed: {e} ({dump})", frame.direction)
            }
            (None, Ok(n)) => trace!("{} ok {n} ({dump})", frame.direction),
            (None, Err(e)) => trace!("{} failed: {e} ({dump})", frame.direction),
        }
    }
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl FrameObserver for NullObserver {
    fn on_frame(&self, _frame: &FrameTrace<'_>) {}
}

/// Hex-encode bytes in space separated groups of four
pub fn hexdump(bytes: &[u8]) -> String {
    bytes
        .chunks(4)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(" ")
}
