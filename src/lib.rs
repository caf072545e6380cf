//! Read samples from MCP3008 analog-to-digital converters.
//!
//! The MCP3008 is a 10-bit, 8-channel ADC with an SPI interface. Each read
//! exchanges a 3 byte frame with the chip. On Linux the bus is accessed
//! through the spidev interface, see [`spidev`]; any other transport can be
//! used by implementing [`SpiBus`].
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # {
//! use mcp3008::{BusConfig, Channel, Mcp3008};
//!
//! let mut adc = Mcp3008::open("SPI0.0", &BusConfig::default())?;
//! println!("Channel 0: {}", adc.read(Channel::Ch0)?);
//! # }
//! # Ok::<(), std::boxed::Box<dyn std::error::Error>>(())
//! ```
//!
//! # spidev permissions
//!
//! On a Raspberry Pi the spidev devices only exist once SPI is enabled with
//! `dtparam=spi=on` in `/boot/config.txt`. They are owned by the `spi` group,
//! add yourself to it to read the ADC as a non superuser.
//!
//! ```text
//! # /etc/udev/rules.d/99-spi.rules
//! SUBSYSTEM=="spidev", GROUP="spi", MODE="0660"
//! ```
#![doc(html_root_url = "https://docs.rs/mcp3008/0.1.0")]

use std::{
    convert::TryFrom,
    fmt, io,
    ops::Index,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{debug, trace};

pub mod bus;
pub mod cmd;
pub mod poll;
#[cfg(test)]
mod sim;
#[cfg(target_os = "linux")]
pub mod spidev;

pub use bus::{BusConfig, Mode, SpiBus};

/// Number of input channels.
pub const CHANNEL_COUNT: usize = 8;

/// ADC input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Ch0,
    Ch1,
    Ch2,
    Ch3,
    Ch4,
    Ch5,
    Ch6,
    Ch7,
}

impl Channel {
    /// Channel number, 0 to 7.
    ///
    /// # Example
    ///
    /// ```
    /// use mcp3008::Channel;
    ///
    /// assert_eq!(Channel::Ch5.idx(), 5);
    /// ```
    pub const fn idx(&self) -> u8 {
        match self {
            Channel::Ch0 => 0,
            Channel::Ch1 => 1,
            Channel::Ch2 => 2,
            Channel::Ch3 => 3,
            Channel::Ch4 => 4,
            Channel::Ch5 => 5,
            Channel::Ch6 => 6,
            Channel::Ch7 => 7,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.idx())
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(idx: u8) -> Result<Self, Self::Error> {
        CHANNELS
            .get(usize::from(idx))
            .copied()
            .ok_or(Error::InvalidChannel(idx))
    }
}

/// Array of all channels, in read order.
pub const CHANNELS: [Channel; CHANNEL_COUNT] = [
    Channel::Ch0,
    Channel::Ch1,
    Channel::Ch2,
    Channel::Ch3,
    Channel::Ch4,
    Channel::Ch5,
    Channel::Ch6,
    Channel::Ch7,
];

/// How the selected channel is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputMode {
    /// Channel against ground.
    SingleEnded,
    /// Channel against its pair partner (CH0/CH1, CH2/CH3, ...).
    PseudoDifferential,
}

impl InputMode {
    fn bits(&self) -> u8 {
        match self {
            InputMode::SingleEnded => cmd::SINGLE_ENDED,
            InputMode::PseudoDifferential => 0,
        }
    }
}

/// One sample from every channel, taken in channel order.
///
/// This is returned by [`Mcp3008::read_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadingSet([u16; CHANNEL_COUNT]);

impl ReadingSet {
    /// Sample for a channel.
    pub fn get(&self, channel: Channel) -> u16 {
        self.0[usize::from(channel.idx())]
    }

    /// Iterate over `(channel, sample)` pairs, channel 0 first.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, u16)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(idx, sample)| (CHANNELS[idx], *sample))
    }

    /// Raw samples indexed by channel number.
    pub const fn as_array(&self) -> &[u16; CHANNEL_COUNT] {
        &self.0
    }
}

impl Index<Channel> for ReadingSet {
    type Output = u16;

    fn index(&self, channel: Channel) -> &u16 {
        &self.0[usize::from(channel.idx())]
    }
}

impl From<ReadingSet> for [u16; CHANNEL_COUNT] {
    fn from(set: ReadingSet) -> Self {
        set.0
    }
}

/// ADC read error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Channel number outside of 0 to 7.
    #[error("invalid channel {0} (expected 0 to 7)")]
    InvalidChannel(u8),
    /// The bus transfer failed.
    #[error("transfer failed on channel {channel}: {source}")]
    Transfer {
        channel: Channel,
        #[source]
        source: io::Error,
    },
    /// The reading set was abandoned before this channel was read.
    #[error("reading cancelled before channel {0}")]
    Cancelled(Channel),
}

/// MCP3008 on a SPI bus.
#[derive(Debug)]
pub struct Mcp3008<B> {
    bus: B,
}

#[cfg(target_os = "linux")]
impl Mcp3008<spidev::Connection> {
    /// Open a spidev port by name, limit its clock, and connect.
    ///
    /// An empty name selects the first spidev device.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mcp3008::{BusConfig, Mcp3008};
    ///
    /// let adc = Mcp3008::open("/dev/spidev0.0", &BusConfig::default())?;
    /// # Ok::<(), mcp3008::spidev::OpenError>(())
    /// ```
    pub fn open(name: &str, config: &BusConfig) -> Result<Self, spidev::OpenError> {
        let mut port: spidev::Spidev = spidev::Spidev::open(name)?;
        port.limit_speed(config.speed_hz)?;
        Ok(Mcp3008::new(port.connect(config)?))
    }
}

impl<B: SpiBus> Mcp3008<B> {
    pub fn new(bus: B) -> Self {
        Mcp3008 { bus }
    }

    /// Read a single-ended sample, 0 to 1023.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # #[cfg(target_os = "linux")]
    /// # {
    /// use mcp3008::{BusConfig, Channel, Mcp3008};
    ///
    /// let mut adc = Mcp3008::open("", &BusConfig::default())?;
    /// // e.g. "Channel 3: 511"
    /// println!("Channel 3: {}", adc.read(Channel::Ch3)?);
    /// # }
    /// # Ok::<(), std::boxed::Box<dyn std::error::Error>>(())
    /// ```
    pub fn read(&mut self, channel: Channel) -> Result<u16, Error> {
        self.read_mode(InputMode::SingleEnded, channel)
    }

    /// Read a pseudo-differential sample, 0 to 1023.
    ///
    /// The channel is measured against its partner: CH0 against CH1, CH1
    /// against CH0, CH2 against CH3, and so on.
    pub fn read_differential(&mut self, channel: Channel) -> Result<u16, Error> {
        self.read_mode(InputMode::PseudoDifferential, channel)
    }

    /// Perform one transfer and decode the sample.
    pub fn read_mode(&mut self, mode: InputMode, channel: Channel) -> Result<u16, Error> {
        let tx: [u8; cmd::FRAME_LEN] = cmd::command(mode.bits(), channel.idx());
        let mut rx: [u8; cmd::FRAME_LEN] = [0; cmd::FRAME_LEN];
        self.bus
            .transfer(&tx, &mut rx)
            .map_err(|source| Error::Transfer { channel, source })?;
        let sample: u16 = cmd::decode(rx);
        trace!(%channel, ?mode, sample, "Read channel");
        Ok(sample)
    }

    /// Read every channel in order, 0 first.
    ///
    /// Stops at the first failed transfer; samples already taken are
    /// discarded.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # #[cfg(target_os = "linux")]
    /// # {
    /// use mcp3008::{BusConfig, Mcp3008};
    ///
    /// let mut adc = Mcp3008::open("", &BusConfig::default())?;
    /// for (channel, sample) in adc.read_all()?.iter() {
    ///     println!("Channel {}: {}", channel, sample);
    /// }
    /// # }
    /// # Ok::<(), std::boxed::Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_all(&mut self) -> Result<ReadingSet, Error> {
        self.read_all_until(&AtomicBool::new(false))
    }

    /// Like [`Mcp3008::read_all`], but checks `cancel` before every channel
    /// and returns [`Error::Cancelled`] once it is set.
    ///
    /// A transfer already in progress is not interrupted.
    pub fn read_all_until(&mut self, cancel: &AtomicBool) -> Result<ReadingSet, Error> {
        let mut samples: [u16; CHANNEL_COUNT] = [0; CHANNEL_COUNT];
        for channel in CHANNELS.iter() {
            if cancel.load(Ordering::Acquire) {
                return Err(Error::Cancelled(*channel));
            }
            samples[usize::from(channel.idx())] = self.read(*channel)?;
        }
        debug!(?samples, "Read all channels");
        Ok(ReadingSet(samples))
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the bus.
    pub fn into_inner(self) -> B {
        self.bus
    }
}
