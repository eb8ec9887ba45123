//! Terminal output for reader state

use colored::Colorize;
use ezifd::{Atr, Presence, ReaderConfig, ReaderStatus};

/// Bold underlined heading on its own line
pub(crate) fn heading(title: &str) -> String {
    format!("\n{}", title.bold().underline())
}

/// Green line for a completed action
pub(crate) fn done(message: &str) -> String {
    format!("✅ {}", message.green().bold())
}

/// Yellow line for something the operator should notice
pub(crate) fn notice(message: &str) -> String {
    format!("⚠️  {}", message.yellow().bold())
}

/// Presence in colour: green with a card, yellow without
pub(crate) fn presence(presence: Presence) -> String {
    let text = presence.to_string();
    if presence.is_present() {
        text.green().to_string()
    } else {
        text.yellow().to_string()
    }
}

/// ATR in space separated byte pairs, with its length
pub(crate) fn atr(atr: &Atr) -> String {
    let bytes = atr
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("  {}\n  {} bytes", bytes.cyan(), atr.len())
}

/// Reader summary: IDs, endpoints and the last status query
pub(crate) fn reader_summary(config: &ReaderConfig, status: Option<&ReaderStatus>) -> String {
    let mut lines = vec![
        heading("Reader"),
        field(
            "Device",
            format!("{:04x}:{:04x}", config.vendor_id, config.product_id),
        ),
        field(
            "Endpoints",
            format!(
                "out {:#04x}, in {:#04x}, irq {:#04x}",
                config.command_endpoint, config.response_endpoint, config.interrupt_endpoint
            ),
        ),
    ];
    if let Some(status) = status {
        lines.push(field("Description", status.description.clone()));
        lines.push(field("Slot", presence(status.card_present.into())));
    }
    lines.join("\n")
}

fn field(name: &str, value: String) -> String {
    format!("  {}: {value}", name.bold())
}
