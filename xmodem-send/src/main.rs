// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use xmodem_send::{Sender, DEFAULT_REPLY_TIMEOUT_MS};

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long)]
    list_ports: bool,
    #[arg(short, long, default_value_t = String::from("/dev/ttyUSB0"))]
    port: String,
    #[arg(short, long, default_value_t = consts::BAUD_RATE)]
    baudrate: u32,
    /// Transmissions of a packet before giving up
    #[arg(short, long, default_value_t = 10)]
    retries: usize,
    /// Wait for each reply, in milliseconds. Must exceed the receiver's packet timeout.
    #[arg(short, long, default_value_t = DEFAULT_REPLY_TIMEOUT_MS)]
    timeout_ms: u64,
    /// Raw application image
    image: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.list_ports {
        let ports = serialport::available_ports()?;
        println!("List of available serial ports:");
        for port in ports {
            println!("- {}", port.port_name);
        }
        return Ok(());
    }

    let Some(path) = args.image else {
        return Err("no image given".into());
    };
    let image = std::fs::read(&path)?;
    tracing::info!("Loaded {} ({} bytes)", path.display(), image.len());

    let mut port = serialport::new(&args.port, args.baudrate)
        .timeout(Duration::from_millis(args.timeout_ms))
        .open()?;

    println!("Waiting for the bootloader on {}...", args.port);
    let total = image.len();
    let summary = Sender::new(args.retries).send(&mut port, &image, |sent| {
        println!("{:>3}% ({}/{} bytes)", sent * 100 / total, sent, total);
    })?;
    println!(
        "Done: {} packets, {} retransmissions",
        summary.packets, summary.retransmissions
    );
    Ok(())
}
