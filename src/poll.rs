//! Periodic polling of every channel.
//!
//! A [`Poller`] waits on two events, the polling interval and a shutdown
//! future. On every tick it reads all eight channels and prints them; on
//! shutdown it prints an exit notice and returns.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # async fn dox() -> Result<(), Box<dyn std::error::Error>> {
//! use mcp3008::{
//!     poll::{PollConfig, Poller},
//!     BusConfig, Mcp3008,
//! };
//!
//! let adc = Mcp3008::open("", &BusConfig::default())?;
//! let mut poller = Poller::new(adc, PollConfig::default());
//! let shutdown = async {
//!     let _ = tokio::signal::ctrl_c().await;
//! };
//! poller.run(&mut std::io::stdout(), shutdown).await?;
//! # Ok(())
//! # }
//! ```

use std::{
    future::Future,
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{bus::SpiBus, Error, Mcp3008, ReadingSet};

/// Printed before the samples of every reading set.
pub const HEADER: &str = "ADC readings:";

/// Printed once when the shutdown future completes.
pub const EXIT_NOTICE: &str = "Received interrupt signal, exiting...";

/// What to do when a reading set cannot be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop polling and return the error.
    Abort,
    /// Collect the reading set again, up to `attempts` more times, sleeping
    /// `backoff` in between. Returns the last error once exhausted.
    Retry { attempts: u32, backoff: Duration },
    /// Log the error and wait for the next tick.
    Skip,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Abort
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between reading sets.
    pub interval: Duration,
    pub failure_policy: FailurePolicy,
    /// Upper bound on collecting one reading set. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: Duration::from_secs(1),
            failure_policy: FailurePolicy::Abort,
            read_timeout: None,
        }
    }
}

/// Poll loop error.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Read(#[from] Error),
    #[error("reading all channels took longer than {0:?}")]
    Timeout(Duration),
    #[error("reader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to write readings: {0}")]
    Output(#[source] io::Error),
    #[error("invalid poll interval {0:?}")]
    InvalidInterval(Duration),
}

/// Counters kept by [`Poller::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Interval ticks handled.
    pub ticks: u64,
    /// Reading sets collected and printed.
    pub reading_sets: u64,
    /// Failed collection attempts, including retried ones.
    pub failures: u64,
    /// Ticks dropped under [`FailurePolicy::Skip`].
    pub skipped: u64,
}

/// Print a reading set, one line per channel.
///
/// # Example
///
/// ```
/// use mcp3008::{poll::write_readings, ReadingSet};
///
/// let mut out: Vec<u8> = Vec::new();
/// write_readings(&mut out, &ReadingSet::default())?;
/// assert!(out.starts_with(b"ADC readings:\nChannel 0: 0\n"));
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn write_readings<W: Write>(out: &mut W, set: &ReadingSet) -> io::Result<()> {
    writeln!(out, "{}", HEADER)?;
    for (channel, sample) in set.iter() {
        writeln!(out, "Channel {}: {}", channel, sample)?;
    }
    out.flush()
}

/// Reads every channel of an ADC on a fixed interval.
pub struct Poller<B> {
    adc: Arc<Mutex<Mcp3008<B>>>,
    config: PollConfig,
    stats: Stats,
}

impl<B: SpiBus + Send + 'static> Poller<B> {
    pub fn new(adc: Mcp3008<B>, config: PollConfig) -> Self {
        Poller {
            adc: Arc::new(Mutex::new(adc)),
            config,
            stats: Stats::default(),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Hand the ADC back.
    ///
    /// Returns `None` while a reading set that timed out is still in flight.
    pub fn into_inner(self) -> Option<Mcp3008<B>> {
        Arc::try_unwrap(self.adc).ok().map(Mutex::into_inner)
    }

    /// Collect one reading set on the blocking pool.
    ///
    /// A timed out collection is cancelled before its next channel; the
    /// transfer in progress still has to finish before the bus is released.
    async fn read_once(&self) -> Result<ReadingSet, PollError> {
        let adc = Arc::clone(&self.adc);
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);
        let task = tokio::task::spawn_blocking(move || adc.lock().read_all_until(&task_cancel));
        let joined = match self.config.read_timeout {
            Some(limit) => match time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.store(true, Ordering::Release);
                    return Err(PollError::Timeout(limit));
                }
            },
            None => task.await,
        };
        Ok(joined??)
    }

    /// Collect a reading set, retrying as the failure policy allows.
    async fn collect(&mut self) -> Result<ReadingSet, PollError> {
        let (mut retries_left, backoff) = match self.config.failure_policy {
            FailurePolicy::Retry { attempts, backoff } => (attempts, backoff),
            FailurePolicy::Abort | FailurePolicy::Skip => (0, Duration::ZERO),
        };
        loop {
            match self.read_once().await {
                Ok(set) => return Ok(set),
                Err(e) => {
                    self.stats.failures += 1;
                    if retries_left == 0 {
                        return Err(e);
                    }
                    retries_left -= 1;
                    warn!(error = %e, retries_left, "Reading set failed, retrying");
                    time::sleep(backoff).await;
                }
            }
        }
    }

    /// Poll until `shutdown` completes or the failure policy gives up.
    ///
    /// The first reading set is taken one interval after the call. A
    /// reading set in progress always finishes before `shutdown` is
    /// checked.
    pub async fn run<W, F>(&mut self, out: &mut W, shutdown: F) -> Result<Stats, PollError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let interval: Duration = self.config.interval;
        if interval == Duration::ZERO {
            return Err(PollError::InvalidInterval(interval));
        }
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(?interval, policy = ?self.config.failure_policy, "Polling");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    writeln!(out, "{}", EXIT_NOTICE).map_err(PollError::Output)?;
                    info!(stats = ?self.stats, "Stopped polling");
                    return Ok(self.stats);
                }
                _ = ticker.tick() => {}
            }

            self.stats.ticks += 1;
            match self.collect().await {
                Ok(set) => {
                    self.stats.reading_sets += 1;
                    debug!(tick = self.stats.ticks, "Collected reading set");
                    write_readings(out, &set).map_err(PollError::Output)?;
                }
                Err(e) if self.config.failure_policy == FailurePolicy::Skip => {
                    self.stats.skipped += 1;
                    warn!(error = %e, "Skipping tick");
                }
                Err(e) => {
                    error!(error = %e, "Giving up");
                    return Err(e);
                }
            }
        }
    }
}
