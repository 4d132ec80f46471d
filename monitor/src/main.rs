//! Serial monitor for the window sensor gateway.
//!
//! Reads the gateway's record lines and keeps the open/closed state,
//! battery level and last activity of every sensor.

mod gateway;
mod state;

use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;

use gateway::{resolve_port, GatewayReader};
use state::{Event, Monitor};

#[derive(Parser)]
#[command(name = "sensor-monitor")]
#[command(about = "Track window sensors through the gateway's serial log")]
struct Args {
    /// Serial port of the gateway (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Sensor ids to track; any sensor is accepted when none are given
    #[arg(short, long, value_delimiter = ',')]
    sensors: Vec<u8>,

    /// Warn about sensors silent for this many minutes
    #[arg(long, default_value = "720")]
    silence_minutes: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let port = resolve_port(&args.port)?;
    let max_silence = Duration::from_secs(args.silence_minutes * 60);

    println!("{}", "Window Sensor Monitor".bold());
    println!("Port: {}", port);
    println!("Baud: {}", args.baud);
    println!();

    let mut reader = GatewayReader::new(&port, args.baud)?;
    let mut monitor = Monitor::new(&args.sensors, Instant::now());
    monitor.set_ready(true);
    println!("{}", "Connected!".green());

    loop {
        let now = Instant::now();
        match reader.next_line() {
            Ok(Some(line)) => report(&line, monitor.handle_line(&line, now), &monitor),
            Ok(None) => {}
            Err(e) => {
                monitor.set_ready(false);
                println!("{} {}", "Gateway disconnected:".red().bold(), e);
                return Err(e);
            }
        }

        for id in monitor.check_activity(now, max_silence) {
            println!("{} sensor #{} silent", "[WARN]".yellow().bold(), id);
        }
    }
}

fn report(line: &str, event: Event, monitor: &Monitor) {
    match event {
        Event::Startup => println!("{} {}", "[GATEWAY]".cyan().bold(), line),
        Event::Fault { node_id, fault } => {
            println!("{} node {}: {}", "[ERROR]".red().bold(), node_id, fault.message())
        }
        Event::Update { node_id, changed } => {
            println!(">> {}", line);
            if changed {
                if let Some(sensor) = monitor.sensor(node_id) {
                    println!("{} {}", "[STATE]".green().bold(), sensor);
                }
            }
        }
        Event::UnknownSensor(node_id) => {
            println!("{} sensor #{} is not configured", "[WARN]".yellow().bold(), node_id)
        }
        Event::Ignored(reason) => println!("{} {} ({})", "[SKIP]".dimmed(), line, reason),
    }
}
