//! Print MCP3008 samples from every channel until interrupted.

use std::{future::Future, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mcp3008::poll::{FailurePolicy, PollConfig};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Poll an MCP3008 ADC over SPI and print the raw samples
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SPI port to use: a device path or SPI<bus>.<cs> (default: first found)
    #[arg(short, long, default_value = "")]
    port: String,

    /// Maximum SPI clock in Hz
    #[arg(long, default_value_t = 1_000_000)]
    speed_hz: u32,

    /// Time between readings in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,

    /// What to do when a reading fails
    #[arg(long, value_enum, default_value_t = OnError::Abort)]
    on_error: OnError,

    /// Extra attempts per reading with --on-error retry
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Delay between attempts in milliseconds with --on-error retry
    #[arg(long, default_value_t = 100)]
    backoff_ms: u64,

    /// Give up on a reading after this many milliseconds (default: never)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// List SPI ports and exit
    #[arg(short, long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnError {
    /// Exit with an error
    Abort,
    /// Read again, then exit with an error
    Retry,
    /// Log the error and wait for the next reading
    Skip,
}

fn poll_config(args: &Args) -> PollConfig {
    let failure_policy = match args.on_error {
        OnError::Abort => FailurePolicy::Abort,
        OnError::Retry => FailurePolicy::Retry {
            attempts: args.retries,
            backoff: Duration::from_millis(args.backoff_ms),
        },
        OnError::Skip => FailurePolicy::Skip,
    };
    PollConfig {
        interval: Duration::from_millis(args.interval_ms),
        failure_policy,
        read_timeout: args.timeout_ms.map(Duration::from_millis),
    }
}

// Log to stderr, filtering according to RUST_LOG, so that readings on
// stdout stay clean.
fn init_tracing(debug: bool) {
    let default = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Drive `future` on a fresh runtime.
///
/// The runtime is shut down without waiting for blocking tasks, so a
/// transfer stuck in the kernel after a read timeout cannot hold up exit.
fn run_until_complete<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = rt.block_on(future);
    rt.shutdown_background();
    result
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);
    run_until_complete(run(args))
}

#[cfg(target_os = "linux")]
async fn run(args: Args) -> Result<()> {
    use mcp3008::{poll::Poller, spidev, BusConfig, Mcp3008};
    use tokio::signal::unix::{self, SignalKind};
    use tracing::{debug, info};

    if args.list {
        let ports = spidev::list().context("Failed to list SPI ports")?;
        if ports.is_empty() {
            println!("No SPI ports found");
        } else {
            println!("Found SPI ports:");
            for (idx, path) in ports.iter().enumerate() {
                println!("{}: {}", idx, path.display());
            }
        }
        return Ok(());
    }

    let bus_config = BusConfig {
        speed_hz: args.speed_hz,
        ..BusConfig::default()
    };
    let adc = Mcp3008::open(&args.port, &bus_config).with_context(|| {
        if args.port.is_empty() {
            "Failed to open the default SPI port".to_string()
        } else {
            format!("Failed to open SPI port {}", args.port)
        }
    })?;
    info!(path = %adc.bus().path().display(), speed_hz = args.speed_hz, "Connected to MCP3008");

    let mut sigint =
        unix::signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm =
        unix::signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
        }
    };

    let mut poller = Poller::new(adc, poll_config(&args));
    let stdout = std::io::stdout();
    let result = poller.run(&mut stdout.lock(), shutdown).await;

    if let Some(adc) = poller.into_inner() {
        drop(adc.into_inner());
        debug!("Closed SPI port");
    }
    result.context("Polling stopped")?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(_args: Args) -> Result<()> {
    anyhow::bail!("SPI access is only supported on Linux")
}
