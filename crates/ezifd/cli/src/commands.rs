//! Subcommand implementations

use std::{error::Error, thread, time::Duration};

use ezifd::{PresenceEvent, Session, UsbBus, event::forward_to, presence_event_channel};
use tracing::debug;

use crate::display;

type CommandResult = Result<(), Box<dyn Error>>;

/// Open the reader and show its status
pub(crate) fn info_command<B: UsbBus>(mut session: Session<B>) -> CommandResult {
    session.open()?;
    println!("{}", display::reader_summary(session.config(), session.status()));
    Ok(())
}

/// Power the card up and print its ATR
pub(crate) fn atr_command<B: UsbBus>(mut session: Session<B>) -> CommandResult {
    session.open()?;
    if !session.presence()?.is_present() {
        println!("{}", display::notice("No card in the reader"));
        return Ok(());
    }

    let atr = session.power_up()?;
    println!("{}", display::heading("Answer to reset"));
    println!("{}", display::atr(&atr));
    Ok(())
}

/// Power the card down
pub(crate) fn power_down_command<B: UsbBus>(mut session: Session<B>) -> CommandResult {
    session.open()?;
    session.power_down()?;
    println!("{}", display::done("Card powered down"));
    Ok(())
}

/// Print whether a card is present
pub(crate) fn presence_command<B: UsbBus>(mut session: Session<B>) -> CommandResult {
    session.open()?;
    println!("{}", display::presence(session.presence()?));
    Ok(())
}

/// Poll presence and print every transition
pub(crate) fn watch_command<B: UsbBus>(
    mut session: Session<B>,
    interval: Duration,
    count: Option<u64>,
) -> CommandResult {
    let (sender, receiver) = presence_event_channel();
    session.set_event_handler(forward_to(sender));
    session.open()?;

    if let Some(presence) = session.last_presence() {
        println!("{}", display::presence(presence));
    }

    let mut polls = 0u64;
    while count.is_none_or(|count| polls < count) {
        session.presence()?;
        for event in receiver.try_iter() {
            match event {
                PresenceEvent::Inserted => println!("{}", display::done("Card inserted")),
                PresenceEvent::Removed => println!("{}", display::notice("Card removed")),
            }
        }

        polls += 1;
        thread::sleep(interval);
    }

    debug!("Stopped after {polls} polls");
    Ok(())
}
