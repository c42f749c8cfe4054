// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! omen-ec-probe: read-only hardware compatibility check.
//!
//! Reads every register the daemon uses and reports whether this machine
//! looks controllable. Never writes to the EC.

use anyhow::{Context, bail};
use clap::Parser;
use omen_fan_utility::ec::{self, EcAccess, EcDev};
use omen_fan_utility::lifecycle;
use std::io::{self, Write};
use std::path::Path;

const DMI_PRODUCT_PATH: &str = "/sys/devices/virtual/dmi/id/product_name";
const SUPPORTED_PRODUCTS: &[&str] = &["OMEN by HP Laptop 16"];

#[derive(Parser, Debug)]
#[command(name = "omen-ec-probe", about = "Read-only EC compatibility probe")]
struct Cli {
    /// Path to the EC debugfs interface.
    #[arg(short, long, default_value = ec::DEFAULT_EC_PATH)]
    device: String,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    println!("omen-ec-probe: read-only EC compatibility check");
    println!("No register is written; this probe only reads.");
    if !cli.yes && !confirm("Proceed with the read-only check? [y/N] ")? {
        println!("Cancelled.");
        return Ok(());
    }

    lifecycle::ensure_root().map_err(anyhow::Error::msg)?;

    check_product_name();

    let device = Path::new(&cli.device);
    if !device.exists() {
        bail!(
            "EC interface {} not found; load ec_sys with write_support=1",
            device.display()
        );
    }
    println!("EC interface present: {}", device.display());

    let ec = EcDev::new(device);
    let readable = dump_registers(&ec);
    report_state(&ec);

    println!();
    if readable == REGISTERS.len() {
        println!("All mapped registers are readable. The next step is the");
        println!("interactive write test (omen-ec-write-test), which carries");
        println!("real risk and asks for its own confirmation.");
    } else {
        println!(
            "Only {readable}/{} registers were readable. Do not attempt",
            REGISTERS.len()
        );
        println!("write tests on this machine.");
    }
    Ok(())
}

/// Registers the daemon and tools touch, with display names.
const REGISTERS: &[(u64, &str)] = &[
    (ec::FAN1_OFFSET, "Fan 1 duty"),
    (ec::FAN2_OFFSET, "Fan 2 duty"),
    (ec::BIOS_OFFSET, "BIOS control"),
    (ec::TIMER_OFFSET, "Firmware timer"),
    (ec::CPU_TEMP_OFFSET, "CPU temperature"),
    (ec::GPU_TEMP_OFFSET, "GPU temperature"),
    (ec::BOOST_OFFSET, "Boost control"),
];

fn check_product_name() {
    match std::fs::read_to_string(DMI_PRODUCT_PATH) {
        Ok(name) => {
            let name = name.trim();
            println!("Product name: {name}");
            if SUPPORTED_PRODUCTS.iter().any(|s| name.contains(s)) {
                println!("Device is in the known-supported list.");
            } else {
                println!("Device is not in the known-supported list; proceed with caution.");
            }
        }
        Err(e) => println!("Cannot read DMI product name: {e}"),
    }
}

/// Read every mapped register, print a table, return how many succeeded.
fn dump_registers(ec: &EcDev) -> usize {
    println!();
    let mut ok = 0;
    for &(offset, name) in REGISTERS {
        match ec.read_byte(offset) {
            Ok(value) => {
                println!("  0x{offset:02X} {name:<16} = {value:3} (0x{value:02X})");
                ok += 1;
            }
            Err(e) => println!("  0x{offset:02X} {name:<16}   read failed: {e}"),
        }
    }
    println!("{ok}/{} registers readable", REGISTERS.len());
    ok
}

fn report_state(ec: &EcDev) {
    println!();
    match ec.read_byte(ec::BIOS_OFFSET) {
        Ok(ec::BIOS_MANUAL) => println!("BIOS fan control: DISABLED (manual override active)"),
        Ok(ec::BIOS_AUTO) => println!("BIOS fan control: ENABLED (firmware automatic)"),
        Ok(other) => println!("BIOS fan control: unknown state ({other})"),
        Err(e) => println!("BIOS fan control: unreadable ({e})"),
    }
    if let Ok(temps) = ec::read_temps(ec) {
        println!(
            "Temperatures: CPU={}°C GPU={}°C (max {}°C)",
            temps.cpu,
            temps.gpu,
            temps.max()
        );
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin().read_line(&mut line).context("read stdin")?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
