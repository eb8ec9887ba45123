//! Command-line tool for EZ100PU smart card readers

use std::time::Duration;

use clap::{Parser, Subcommand};
use ezifd::{
    ReaderConfig, RusbBus, Session, UsbBus,
    mock::{MockBus, SimulatedReader},
};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

mod commands;
mod display;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Inspect and drive EZ100PU smart card readers")]
struct Cli {
    /// USB vendor ID in hex
    #[arg(long, value_parser = parse_hex_u16, default_value = "0ca6")]
    vendor_id: u16,

    /// USB product ID in hex
    #[arg(long, value_parser = parse_hex_u16, default_value = "0010")]
    product_id: u16,

    /// Bulk transfer timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// USB interface to claim before talking to the reader
    #[arg(long)]
    interface: Option<u8>,

    /// Use a simulated reader instead of USB hardware
    #[arg(long)]
    simulate: bool,

    /// Trace level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the reader and show its status
    Info,

    /// Power up the card and print its ATR
    Atr,

    /// Power down the card
    PowerDown,

    /// Show whether a card is present
    Presence,

    /// Watch for card insertion and removal
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,

        /// Stop after this many polls
        #[arg(long)]
        count: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = ReaderConfig::new()
        .with_ids(cli.vendor_id, cli.product_id)
        .with_bulk_timeout(Duration::from_millis(cli.timeout_ms))
        .with_interface(cli.interface);

    if cli.simulate {
        info!("Using simulated reader");
        let reader = SimulatedReader::with_card().with_ids(cli.vendor_id, cli.product_id);
        run(Session::new(MockBus::new(reader), config), &cli.command)
    } else {
        info!(
            "Using USB reader {:04x}:{:04x}",
            cli.vendor_id, cli.product_id
        );
        run(Session::new(RusbBus::new()?, config), &cli.command)
    }
}

fn run<B: UsbBus>(
    session: Session<B>,
    command: &Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Info => info_command(session),
        Commands::Atr => atr_command(session),
        Commands::PowerDown => power_down_command(session),
        Commands::Presence => presence_command(session),
        Commands::Watch { interval_ms, count } => {
            watch_command(session, Duration::from_millis(*interval_ms), *count)
        }
    }
}

fn parse_hex_u16(value: &str) -> Result<u16, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex ID {value:?}: {e}"))
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(level).into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .init();
}
