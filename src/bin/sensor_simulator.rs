//! Motor Sensor Simulator
//!
//! Publishes synthetic motor telemetry to the feed topic for exercising
//! motor-sentinel end to end. Roughly four in five readings are healthy;
//! the rest are drawn from one of three fault profiles:
//! - High temperature (overheating winding or bearing)
//! - High vibration (imbalance, misalignment)
//! - Stall (near-zero speed under heavy vibration)
//!
//! # Usage
//! ```bash
//! # Publish every 2s to the public test broker
//! ./sensor-simulator
//!
//! # Generate a reproducible replay capture for `motor-sentinel --replay`
//! ./sensor-simulator --stdout --count 200 --seed 7 > readings.jsonl
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rand::prelude::*;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::io::{self, Write};
use std::ops::Range;
use std::time::Duration;
use tracing::{info, warn};

use motor_sentinel::config::defaults;
use motor_sentinel::logging::{self, LogFormat};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "sensor-simulator")]
#[command(about = "Synthetic motor telemetry publisher for motor-sentinel testing")]
#[command(version)]
struct Args {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", default_value = defaults::BROKER_HOST)]
    host: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = defaults::BROKER_PORT)]
    port: u16,

    /// Topic to publish on
    #[arg(long, default_value = defaults::FEED_TOPIC)]
    topic: String,

    /// Seconds between readings
    #[arg(short, long, default_value_t = defaults::SIMULATION_INTERVAL_SECS)]
    interval: u64,

    /// Stop after this many readings (default: run until Ctrl+C)
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Write JSON lines to stdout instead of publishing (no delay)
    #[arg(long)]
    stdout: bool,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

// ============================================================================
// Reading Profiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Profile {
    Normal,
    HighTemperature,
    HighVibration,
    Stall,
}

impl Profile {
    const FAULTS: [Profile; 3] = [Profile::HighTemperature, Profile::HighVibration, Profile::Stall];

    fn label(&self) -> &'static str {
        match self {
            Profile::Normal => "NORMAL",
            Profile::HighTemperature => "HIGH TEMP",
            Profile::HighVibration => "HIGH VIB",
            Profile::Stall => "STALL",
        }
    }

    /// (temperature °C, vibration g, rpm) ranges.
    fn ranges(&self) -> (Range<f64>, Range<f64>, Range<u32>) {
        match self {
            Profile::Normal => (20.0..35.0, 0.1..0.5, 2500..3001),
            Profile::HighTemperature => (60.0..80.0, 0.5..0.8, 2000..2801),
            Profile::HighVibration => (30.0..45.0, 2.0..5.0, 2000..2801),
            Profile::Stall => (50.0..65.0, 3.0..6.0, 0..501),
        }
    }
}

/// Wire payload, same shape the pipeline decodes.
#[derive(Debug, Serialize)]
struct Payload {
    temperature: f64,
    vibration: f64,
    rpm: u32,
    timestamp: i64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

struct Generator {
    rng: StdRng,
}

impl Generator {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    fn pick_profile(&mut self) -> Profile {
        if self.rng.gen_bool(defaults::SIMULATION_NORMAL_RATIO) {
            Profile::Normal
        } else {
            Profile::FAULTS[self.rng.gen_range(0..Profile::FAULTS.len())]
        }
    }

    fn next(&mut self) -> (Profile, Payload) {
        let profile = self.pick_profile();
        let (temp, vib, rpm) = profile.ranges();
        let payload = Payload {
            temperature: round_to(self.rng.gen_range(temp), 1),
            vibration: round_to(self.rng.gen_range(vib), 3),
            rpm: self.rng.gen_range(rpm),
            timestamp: chrono::Utc::now().timestamp(),
        };
        (profile, payload)
    }
}

// ============================================================================
// Output
// ============================================================================

fn run_stdout(generator: &mut Generator, count: u64) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for _ in 0..count {
        let (_, payload) = generator.next();
        let line = serde_json::to_string(&payload)?;
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

async fn run_publish(args: &Args, generator: &mut Generator) -> Result<()> {
    let client_id = format!("motor-sensor-sim-{}", std::process::id());
    let mut options = MqttOptions::new(client_id, &args.host, args.port);
    options.set_keep_alive(Duration::from_secs(defaults::KEEP_ALIVE_SECS));

    let (client, mut eventloop) = AsyncClient::new(options, 16);

    // Publishes only leave the process while the event loop is polled.
    let network = tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                warn!(error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!(
        "📡 Publishing to {}:{} topic '{}' every {}s",
        args.host, args.port, args.topic, args.interval
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    let mut published = 0u64;
    let mut faults = 0u64;

    loop {
        if args.count.is_some_and(|n| published >= n) {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Received Ctrl+C, stopping");
                break;
            }
        }

        let (profile, payload) = generator.next();
        let body = serde_json::to_vec(&payload)?;
        client
            .publish(args.topic.as_str(), QoS::AtLeastOnce, false, body)
            .await
            .context("Failed to queue publish")?;

        published += 1;
        if profile != Profile::Normal {
            faults += 1;
        }
        info!(
            "[{}] Temp={:.1}°C Vib={:.3}g RPM={}",
            profile.label(),
            payload.temperature,
            payload.vibration,
            payload.rpm
        );
    }

    if let Err(e) = client.disconnect().await {
        warn!(error = %e, "Disconnect request not queued");
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    network.abort();

    info!("✓ Published {} readings ({} fault profiles)", published, faults);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    logging::init(args.log_format);

    let mut generator = Generator::new(args.seed);

    if args.stdout {
        return run_stdout(&mut generator, args.count.unwrap_or(100));
    }
    run_publish(&args, &mut generator).await
}
