//! USB protocol engine and IFD handler for EZ100PU smart card readers
//!
//! The reader speaks a small vendor protocol: 10-byte command frames on a
//! bulk OUT endpoint, responses on a bulk IN endpoint, and 2-byte card
//! presence notifications on an interrupt endpoint. This crate turns that
//! protocol into a [`Session`] with explicit power and presence state, and
//! exposes the session through the [`IfdHandler`] entry points a smart-card
//! middleware expects from a reader driver.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use ezifd::{ReaderConfig, RusbBus, Session};
//!
//! let mut session = Session::new(RusbBus::new()?, ReaderConfig::default());
//! session.open()?;
//!
//! if session.presence()?.is_present() {
//!     let atr = session.power_up()?;
//!     println!("ATR: {atr}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The [`mock`] module provides an in-memory reader for running the same
//! code without hardware.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atr;
pub mod codec;
mod config;
pub mod constants;
mod error;
pub mod event;
pub mod ifd;
pub mod mock;
pub mod observer;
pub mod power;
pub mod presence;
mod session;
pub mod transport;

// Public exports
pub use atr::Atr;
pub use codec::{CommandCode, CommandFrame, ResponseFrame};
pub use config::ReaderConfig;
pub use error::{Error, Result};
pub use event::{PresenceEvent, PresenceEventHandler, presence_event_channel};
pub use ifd::{IfdHandler, Lun, ResponseCode, Tag};
pub use observer::{FrameObserver, NullObserver, TracingObserver};
pub use power::{PowerAction, PowerState};
pub use presence::{Presence, ReaderStatus};
pub use session::Session;
pub use transport::{RusbBus, TransportError, UsbBus, UsbDevice};

/// Common imports for driving a reader
pub mod prelude {
    pub use crate::{
        Atr, Error, IfdHandler, PowerAction, Presence, PresenceEvent, ReaderConfig, ResponseCode,
        Result, Session, UsbBus,
    };
}
