// SPDX-License-Identifier: MPL-2.0

//! Full bridge example.
//!
//! Reads VE.Direct telemetry from a serial port and republishes it to an
//! MQTT broker with Home Assistant discovery, reconnecting forever.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example bridge -- <serial_path> <device_type> <device_name> <broker_host> [username] [password]
//! ```
//!
//! # Examples
//!
//! ```bash
//! # MPPT charger on a USB adapter, anonymous broker
//! cargo run --example bridge -- /dev/ttyUSB0 mppt "Garden Array" 192.168.1.50
//!
//! # SmartShunt with broker credentials
//! cargo run --example bridge -- /dev/ttyUSB1 shunt "House Battery" 192.168.1.50 mqtt_user mqtt_pass
//! ```

use std::env;
use std::time::Duration;

use vedirect_bridge::{Bridge, BridgeConfig, DeviceCatalog};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let catalog = DeviceCatalog::builtin();
    let device_type = &args[2];
    if catalog.device_type(device_type).is_none() {
        eprintln!("Unknown device type: {device_type}");
        eprintln!("Available: {}", catalog.keys().collect::<Vec<_>>().join(", "));
        std::process::exit(1);
    }

    let mut builder = BridgeConfig::builder()
        .serial_path(&args[1])
        .device_type(device_type)
        .device_name(&args[3])
        .broker(&args[4])
        .reconnect_backoff(Duration::from_secs(30));

    if args.len() >= 7 {
        builder = builder.credentials(&args[5], &args[6]);
    }

    let config = builder.build()?;
    let bridge = Bridge::new(config, &catalog)?;

    println!("=== VE.Direct Bridge ===");
    println!("Serial: {}", args[1]);
    println!("Device: {} ({device_type})", args[3]);
    println!("Broker: {}", args[4]);
    println!();
    println!("Running until terminated (Ctrl+C to exit)");

    // Runs forever; every recoverable fault is retried after the backoff.
    bridge.run().await;
    Ok(())
}

fn print_usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {program} <serial_path> <device_type> <device_name> <broker_host> [username] [password]");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {program} /dev/ttyUSB0 mppt \"Garden Array\" 192.168.1.50");
    eprintln!("  {program} /dev/ttyUSB1 shunt \"House Battery\" 192.168.1.50 user pass");
}
