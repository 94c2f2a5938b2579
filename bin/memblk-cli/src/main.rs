//! memblk - in-memory block device driver
//!
//! Builds a store and device from configuration and drives them from the
//! command line.

mod stress;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use memblk_chardev::{BytePipe, CharDevError, EchoControl, EchoDevice};
use memblk_common::Config;
use memblk_core::{BlockDevice, Operation, Outcome, Request, Segment, create_store};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "memblk")]
#[command(about = "In-memory block device driver")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/memblk/memblk.toml")]
    config: String,

    /// Store capacity in bytes
    #[arg(long)]
    capacity: Option<u64>,

    /// Sector size in bytes
    #[arg(long)]
    sector_size: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store and print its geometry
    Info,
    /// Run the reference request scenarios against a 4 KiB store
    Scenario,
    /// Hammer one device with concurrent scatter/gather requests
    Stress {
        /// Concurrent callers
        #[arg(long, default_value = "4")]
        workers: usize,
        /// Requests per caller
        #[arg(long, default_value = "1000")]
        requests: usize,
        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Write to the echo device and read it back
    Echo {
        /// Text to write
        #[arg(long, default_value = "hello from memblk")]
        write: String,
        /// Grow the buffer to this size before writing
        #[arg(long)]
        grow: Option<usize>,
    },
    /// Push bytes through the pipe between a producer and a consumer
    Pipe {
        /// Bytes to transfer
        #[arg(long, default_value = "1048576")]
        bytes: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config file if it exists
    let mut config: Config = if std::path::Path::new(&args.config).exists() {
        let config_str = std::fs::read_to_string(&args.config)
            .with_context(|| format!("failed to read config file {}", args.config))?;
        toml::from_str(&config_str).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to parse config file: {e}");
            Config::default()
        })
    } else {
        Config::default()
    };

    // CLI takes precedence
    if let Some(capacity) = args.capacity {
        config.device.capacity_bytes = capacity;
    }
    if let Some(sector_size) = args.sector_size {
        config.device.sector_size = sector_size;
    }
    let log_level = if args.log_level == "info" {
        config.logging.level.clone()
    } else {
        args.log_level
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;
    info!("Config file: {}", args.config);

    match args.command {
        Commands::Info => info_cmd(&config),
        Commands::Scenario => scenario_cmd(),
        Commands::Stress {
            workers,
            requests,
            seed,
        } => stress::run(&config, workers, requests, seed).await,
        Commands::Echo { write, grow } => echo_cmd(&config, &write, grow),
        Commands::Pipe { bytes } => pipe_cmd(&config, bytes).await,
    }
}

fn info_cmd(config: &Config) -> Result<()> {
    let store = create_store(config.device.capacity_bytes, config.device.sector_size)?;
    let device = BlockDevice::new(config.device.name.clone(), store);
    let geometry = device.attach()?;

    println!("Device: {}", device.name());
    println!("=======");
    println!("Sectors:     {}", geometry.capacity_sectors());
    println!("Sector size: {} bytes", geometry.sector_size());
    println!("Capacity:    {} bytes", geometry.capacity_bytes());

    device.detach()?;
    device.destroy()?;
    Ok(())
}

fn print_outcome(label: &str, outcome: &Outcome) {
    print!(
        "{label:<40} {:?} (errno {}): {} bytes, {} segment(s)",
        outcome.status,
        outcome.errno(),
        outcome.bytes_transferred,
        outcome.segments_completed
    );
    match &outcome.error {
        Some(err) => println!(" ({err})"),
        None => println!(),
    }
}

fn scenario_cmd() -> Result<()> {
    let device = BlockDevice::new("scenario", create_store(4096, 512)?);
    device.attach()?;

    let pattern = [0xAA; 512];
    let outcome = device.submit_wait(Request::write(0).segment(Segment::source(&pattern)))?;
    print_outcome("write 512 x 0xAA at sector 0", &outcome);

    let mut back = [0u8; 512];
    let outcome = device.submit_wait(Request::read(0).segment(Segment::sink(&mut back)))?;
    print_outcome("read 512 at sector 0", &outcome);
    if back != pattern {
        bail!("read back differs from written pattern");
    }

    let before = device.store().read_range(0, 4096)?;
    let long = [0x55; 1024];
    let outcome = device.submit_wait(Request::write(7).segment(Segment::source(&long)))?;
    print_outcome("write 1024 at sector 7", &outcome);
    if device.store().read_range(0, 4096)? != before {
        bail!("rejected write changed the store");
    }

    device.submit_wait(Request::discard(0, 4096))?;
    let small = [0x11; 100];
    let large = [0x22; 4000];
    let outcome = device.submit_wait(
        Request::write(0)
            .segment(Segment::source(&small))
            .segment(Segment::source(&large)),
    )?;
    print_outcome("write [100, 4000] at sector 0", &outcome);
    let after = device.store().read_range(0, 4096)?;
    if after[..100] != small || after[100..].iter().any(|&b| b != 0) {
        bail!("partial write left unexpected contents");
    }

    let outcome = device.submit_wait(Request::zero_fill(0, 4096))?;
    print_outcome("zero-fill whole store", &outcome);

    let outcome = device.submit_wait(Request::new(Operation::from(3u16), 0, Vec::new()))?;
    print_outcome("operation code 3", &outcome);

    device.detach()?;
    device.destroy()?;
    Ok(())
}

fn echo_cmd(config: &Config, text: &str, grow: Option<usize>) -> Result<()> {
    let echo = EchoDevice::from_config(&config.echo).map_err(device_error)?;
    echo.open();

    if let Some(size) = grow {
        let reply = echo
            .control(EchoControl::Grow(size))
            .map_err(device_error)?;
        println!("Grow: {reply:?}");
    }

    let written = echo.write(text.as_bytes());
    let data = echo.read(0, echo.size());
    println!("Wrote {written} of {} bytes", text.len());
    println!("Read back: {:?}", String::from_utf8_lossy(&data));
    println!("{:?}", echo.control(EchoControl::CurrentLength).map_err(device_error)?);
    println!("{:?}", echo.control(EchoControl::MaxSize).map_err(device_error)?);
    println!("Grow limit: {} bytes", echo.max_size());

    echo.release();
    Ok(())
}

async fn pipe_cmd(config: &Config, bytes: usize) -> Result<()> {
    let pipe = Arc::new(BytePipe::from_config(&config.pipe).map_err(device_error)?);
    let start = Instant::now();

    let producer = {
        let pipe = Arc::clone(&pipe);
        tokio::task::spawn_blocking(move || {
            let data: Vec<u8> = (0..bytes).map(pattern_byte).collect();
            let written = pipe.write(&data);
            pipe.close();
            written
        })
    };

    let consumer = {
        let pipe = Arc::clone(&pipe);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; bytes];
            let read = pipe.read(&mut buf)?;
            let mismatches = buf[..read]
                .iter()
                .enumerate()
                .filter(|&(i, &b)| b != pattern_byte(i))
                .count();
            Ok::<_, CharDevError>((read, mismatches))
        })
    };

    let (written, received) = tokio::try_join!(producer, consumer)?;
    let written = written.map_err(device_error)?;
    let (read, mismatches) = received.map_err(device_error)?;
    let elapsed = start.elapsed();

    println!("Pipe capacity: {} bytes", pipe.capacity());
    println!("Written: {written} bytes, read: {read} bytes in {elapsed:?}");
    if read != bytes || mismatches > 0 {
        bail!("pipe transfer corrupted: {mismatches} mismatched byte(s)");
    }
    Ok(())
}

/// Report a character device error the way a device caller would see it
fn device_error(err: CharDevError) -> anyhow::Error {
    let errno = err.errno();
    anyhow::Error::new(memblk_common::Error::from(err))
        .context(format!("device error (errno {errno})"))
}

#[allow(clippy::cast_possible_truncation)]
const fn pattern_byte(i: usize) -> u8 {
    (i % 251) as u8
}
