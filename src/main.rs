use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{bail, Context, Result};
use clap::Parser;

use adc8_rs::transport::DEFAULT_BAUD_RATE;
use adc8_rs::{config, discovery, logging, storage, Session};

#[derive(Parser, Debug)]
#[command(
    name = "adc8-acquire",
    about = "Configure an ADC-8 board and run one acquisition"
)]
struct Args {
    /// Path to the acquisition config JSON
    config: PathBuf,
    /// Output CSV path
    output: PathBuf,
    /// Serial port (e.g. /dev/ttyUSB0); scans USB ports when omitted
    #[arg(long)]
    port: Option<String>,
    /// Baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = config::load(&args.config)?;

    let mut session = match &args.port {
        Some(port) => Session::open(port, args.baud)?,
        None => match discovery::auto_connect(args.baud) {
            Some(session) => session,
            None => bail!("no board found on any candidate port"),
        },
    };
    println!(
        "Connected: {} (serial {})",
        session.id(),
        session.serial_number()
    );

    session.configure(&config)?;
    println!(
        "Configured {} channels at {} Hz",
        session.channel_count(),
        config.sampling
    );

    println!("Acquiring for {} s...", config.time_acquire);
    let acquisition = session.acquire(config.time_acquire)?;
    println!(
        "Decoded {} sample vectors{}",
        acquisition.samples.len(),
        if acquisition.timed_out {
            " (ended on read timeout)"
        } else {
            ""
        }
    );

    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    storage::write_samples(BufWriter::new(file), &acquisition.samples)?;
    println!("Saved to {}", args.output.display());

    session.close();
    Ok(())
}
