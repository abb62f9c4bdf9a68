//! Demo: Watching a Bluetooth Adapter
//!
//! Subscribes to every stream the adapter offers and prints what happens
//! for a fixed time: adapter status, scan sessions, advertisements and
//! connection events.
//!
//! Run with: `cargo run --example watch_adapter -- [config.toml] [seconds]`
//!
//! Set `RUST_LOG=blecast_core=debug` to see session and registry logging.

use std::collections::HashSet;
use std::env;
use std::time::Duration;

use anyhow::Context;
use blecast_core::{Adapter, AdapterConfig, BtleplugCentral};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => AdapterConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => AdapterConfig::default(),
    };
    let seconds: u64 = match args.next() {
        Some(value) => value.parse().context("duration must be a number of seconds")?,
        None => 10,
    };

    let central = BtleplugCentral::with_options(&config.btleplug)
        .await
        .context("opening Bluetooth adapter")?;
    println!("Adapter: {}", central.description());

    let adapter = Adapter::with_config(central, config);

    let mut status = adapter.status_changes();
    let mut scanning = adapter.scanning_status_changes();
    let mut connections = adapter.device_status_changes();
    let mut scan = adapter.scan();

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    let mut seen = HashSet::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Some(status) = status.next() => println!("status: {}", status),
            Some(active) = scanning.next() => println!("scanning: {}", active),
            Some(device) = connections.next() => {
                println!("connection: {} -> {}", device, device.connection_state());
            }
            Some(result) = scan.next() => {
                if seen.insert(result.device().id()) {
                    let advertisement = result.advertisement();
                    println!("new device: {} ({} dBm)", result.device(), result.rssi());
                    for service in &advertisement.service_uuids {
                        println!("    service: {}", service);
                    }
                    if let Some(manufacturer) = &advertisement.manufacturer_data {
                        println!(
                            "    manufacturer: {:04X} {:02X?}",
                            manufacturer.company_id,
                            manufacturer.data.as_ref()
                        );
                    }
                }
            }
        }
    }

    drop(scan);
    println!();
    println!("Saw {} device(s) in {}s", seen.len(), seconds);
    Ok(())
}
