//! Command-line control for the Sunset lamp
//!
//! One-shot commands (scan, set, demo) and `run`, which drives a sync
//! session from lines typed on stdin.

mod config;
mod console;
mod demo;

use std::future::Future;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sunset_ble_controller::{BtleplugTransport, DeviceLink, MemoryTransport, Transport, ble};
use sunset_proto::{Brightness, CipherBox, Color, EncryptedFrame, Speed, block_from_hex, encode_rgb_frame};
use sunset_sync::SessionConfig;
use tokio::io::BufReader;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::demo::Routine;

#[derive(Parser)]
#[command(name = "sunset-ble")]
#[command(about = "Control the Sunset lamp over BLE")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby BLE devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
        /// Also write the results to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List services and characteristics of the lamp
    Services {
        /// Device address (defaults to the configured one)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Send one color to the lamp
    Set {
        r: u8,
        g: u8,
        b: u8,
        #[arg(short, long, default_value = "100")]
        brightness: u8,
        #[arg(short, long, default_value = "100")]
        speed: u8,
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Play a canned color sequence
    Demo {
        #[arg(value_enum, default_value = "basic")]
        routine: Routine,
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Print the plaintext and encrypted frame for a color
    Encode {
        r: u8,
        g: u8,
        b: u8,
        #[arg(short, long, default_value = "100")]
        brightness: u8,
        #[arg(short, long, default_value = "100")]
        speed: u8,
    },
    /// Decrypt a captured 16-byte payload
    Decode {
        /// 32 hex digits
        payload: String,
    },
    /// Run a sync session, reading commands from stdin
    Run {
        #[arg(short, long)]
        device: Option<String>,
        /// Initial manual color
        #[arg(short, long, default_value = "255,255,255", value_parser = console::parse_color)]
        color: Color,
        /// Initial manual brightness
        #[arg(short, long, default_value = "100")]
        brightness: u8,
        /// Use an in-memory lamp instead of Bluetooth
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { duration, output } => scan(duration, output).await?,
        Commands::Services { device } => services(&load_config()?.address(device)).await?,
        Commands::Set { r, g, b, brightness, speed, device } => {
            let link = connect(&load_config()?, device).await?;
            let color = Color::new(r, g, b);
            let (brightness, speed) = (Brightness::new(brightness), Speed::new(speed));
            println!("Sending {color}, brightness {brightness}, speed {speed}");
            let sent = interruptible(link.send_color(color, brightness, speed), ctrl_c()).await;
            link.close().await?;
            if let Some(sent) = sent {
                println!("Payload: {}", sent?.to_hex());
            }
        }
        Commands::Demo { routine, device } => {
            let config = load_config()?;
            let link = connect(&config, device).await?;
            let played = interruptible(play(&link, routine, Speed::new(config.speed)), ctrl_c()).await;
            link.close().await?;
            if let Some(result) = played {
                result?;
            }
        }
        Commands::Encode { r, g, b, brightness, speed } => {
            encode(Color::new(r, g, b), Brightness::new(brightness), Speed::new(speed));
        }
        Commands::Decode { payload } => decode(&payload)?,
        Commands::Run { device, color, brightness, dry_run } => {
            let config = load_config()?;
            let session = config.session(config.address(device));
            let brightness = Brightness::new(brightness);
            if dry_run {
                run(MemoryTransport::new(), session, color, brightness).await?;
            } else {
                run(BtleplugTransport::new().await?, session, color, brightness).await?;
            }
        }
    }

    Ok(())
}

fn load_config() -> Result<Config, config::ConfigError> {
    let home = config::sunset_home()?;
    let config = Config::load_or_create(&home)?;
    debug!(home = %home.display(), ?config, "loaded config");
    Ok(config)
}

fn encode(color: Color, brightness: Brightness, speed: Speed) {
    let frame = encode_rgb_frame(color, brightness, speed);
    let payload = CipherBox::new().encrypt(&frame);
    println!("{color}, brightness {brightness}, speed {speed}");
    println!("Frame:   {}", frame.to_hex());
    println!("Payload: {}", payload.to_hex());
}

fn decode(hex: &str) -> Result<(), Box<dyn std::error::Error>> {
    let payload = EncryptedFrame::from_bytes(block_from_hex(hex)?);
    let frame = CipherBox::new().decrypt(&payload)?;
    println!("Frame:      {}", frame.to_hex());
    println!("Command:    {:?}", frame.command_type());
    println!("Group:      {}", frame.group_id());
    println!("Color:      {}", frame.color());
    println!("Brightness: {}", frame.brightness());
    println!("Speed:      {}", frame.speed());
    Ok(())
}

async fn scan(duration: u64, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for BLE devices ({duration} seconds)...");
    let devices = ble::scan(Duration::from_secs(duration)).await?;

    let lines: Vec<String> = devices
        .iter()
        .map(|d| {
            let rssi = d.rssi.map(|r| format!("{r} dBm")).unwrap_or_else(|| "N/A".to_string());
            format!("Address: {} | RSSI: {} | Name: {}", d.address, rssi, d.name)
        })
        .collect();

    println!("\nFound {} devices:", lines.len());
    for line in &lines {
        println!("  {line}");
    }

    if let Some(path) = output {
        let mut file = std::fs::File::create(&path)?;
        for line in &lines {
            writeln!(file, "{line}")?;
        }
        println!("Results saved to {}", path.display());
    }
    Ok(())
}

async fn services(address: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Connecting to {address}...");
    for service in ble::services(address).await? {
        println!("[Service] {}", service.uuid);
        for (uuid, props) in &service.characteristics {
            println!("  [Char] {uuid} ({props:?})");
        }
    }
    Ok(())
}

async fn connect(
    config: &Config,
    device: Option<String>,
) -> Result<DeviceLink<BtleplugTransport>, Box<dyn std::error::Error>> {
    let address = config.address(device);
    println!("Connecting to {address}...");
    let transport = BtleplugTransport::new().await?;
    let link = DeviceLink::connect(transport, &address, config.connect_timeout()).await?;
    println!("Connected to {}", link.address());
    Ok(link)
}

async fn play<T: Transport>(
    link: &DeviceLink<T>,
    routine: Routine,
    speed: Speed,
) -> Result<(), Box<dyn std::error::Error>> {
    for step in routine.steps() {
        println!("{:<14} {} at {}", step.label, step.color, step.brightness);
        link.send_color(step.color, step.brightness, speed).await?;
        tokio::time::sleep(step.hold).await;
    }
    println!("Demo complete");
    Ok(())
}

#[cfg(feature = "capture")]
fn screen() -> sunset_sync::XcapScreen {
    sunset_sync::XcapScreen
}

#[cfg(not(feature = "capture"))]
fn screen() -> sunset_sync::NoScreen {
    sunset_sync::NoScreen
}

async fn run<T: Transport>(
    transport: T,
    config: SessionConfig,
    color: Color,
    brightness: Brightness,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(address = %config.address, "starting session");
    let (session, events) = sunset_sync::start(transport, screen(), config, color, brightness);
    println!("{}", console::HELP);

    let stdin = BufReader::new(tokio::io::stdin());
    console::drive(session, events, stdin, ctrl_c()).await
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Run `work` unless `shutdown` fires first
async fn interruptible<F: Future>(work: F, shutdown: impl Future<Output = ()>) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        () = shutdown => {
            println!("Interrupted, disconnecting...");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sunset_ble_controller::CONNECT_TIMEOUT;

    #[tokio::test]
    async fn interrupted_demo_still_releases() {
        let transport = MemoryTransport::new();
        let link = DeviceLink::connect(transport.clone(), "AA:BB:CC:DD:EE:FF", CONNECT_TIMEOUT)
            .await
            .unwrap();

        let played = interruptible(
            play(&link, Routine::Basic, Speed::MAX),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;
        link.close().await.unwrap();

        assert!(played.is_none());
        // the first step holds for two seconds
        assert_eq!(transport.writes().len(), 1);
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn finished_work_is_returned() {
        let output = interruptible(async { 7 }, std::future::pending()).await;
        assert_eq!(output, Some(7));
    }
}
