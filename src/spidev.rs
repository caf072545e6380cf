//! Linux spidev bus.
//!
//! This talks to `/dev/spidevB.C` character devices through the `spidev`
//! crate, adding port lookup by name and the open, limit, connect sequence.
//!
//! # Example
//!
//! ```no_run
//! use mcp3008::{spidev::Spidev, BusConfig, SpiBus};
//!
//! let mut port: Spidev = Spidev::open("SPI0.0")?;
//! port.limit_speed(1_000_000)?;
//! let mut conn = port.connect(&BusConfig::default())?;
//! let mut rx = [0u8; 3];
//! conn.transfer(&[0x01, 0x80, 0x00], &mut rx)?;
//! # Ok::<(), std::boxed::Box<dyn std::error::Error>>(())
//! ```

use std::{
    ffi::OsStr,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use ::spidev::{SpiModeFlags, Spidev as Device, SpidevOptions, SpidevTransfer};
use tracing::{debug, info, trace};

use crate::bus::{check_len, BusConfig, Mode, SpiBus};

fn mode_flags(mode: Mode) -> SpiModeFlags {
    match mode {
        Mode::Mode0 => SpiModeFlags::SPI_MODE_0,
        Mode::Mode1 => SpiModeFlags::SPI_MODE_1,
        Mode::Mode2 => SpiModeFlags::SPI_MODE_2,
        Mode::Mode3 => SpiModeFlags::SPI_MODE_3,
    }
}

/// Bus open or configuration error.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// IO error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// No port name was given and no spidev devices exist.
    #[error("no SPI ports found under /dev")]
    NoPort,
    /// The port name is neither a path nor in the form `SPI<bus>.<cs>`.
    #[error("invalid SPI port name {0:?}")]
    InvalidName(String),
    /// A clock rate of zero was requested.
    #[error("invalid clock rate {0} Hz")]
    InvalidSpeed(u32),
    /// The requested clock rate is above the limit set with
    /// [`Spidev::limit_speed`].
    #[error("clock rate {requested} Hz exceeds the {limit} Hz limit")]
    SpeedTooHigh { requested: u32, limit: u32 },
    /// Only 8 bit words are supported.
    #[error("unsupported word width of {0} bits")]
    BitsPerWord(u8),
}

/// Parses the (bus, chip select) pair from a `spidevB.C` file name.
fn parse_file_name(name: &OsStr) -> Option<(u32, u32)> {
    parse_bus_cs(name.to_str()?.strip_prefix("spidev")?)
}

fn parse_bus_cs(data: &str) -> Option<(u32, u32)> {
    let (bus, cs) = data.split_once('.')?;
    Some((bus.parse().ok()?, cs.parse().ok()?))
}

/// Resolves a port name to a device path.
///
/// Accepts an absolute path, `SPI<bus>.<cs>`, `spidev<bus>.<cs>` or just
/// `<bus>.<cs>`.
fn port_path(name: &str) -> Option<PathBuf> {
    if name.starts_with('/') {
        return Some(PathBuf::from(name));
    }
    let rest: &str = name
        .strip_prefix("SPI")
        .or_else(|| name.strip_prefix("spidev"))
        .unwrap_or(name);
    let (bus, cs) = parse_bus_cs(rest)?;
    Some(PathBuf::from(format!("/dev/spidev{}.{}", bus, cs)))
}

/// List spidev device paths, ordered by bus then chip select.
///
/// # Example
///
/// ```no_run
/// for path in mcp3008::spidev::list()? {
///     println!("{}", path.display());
/// }
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn list() -> io::Result<Vec<PathBuf>> {
    let mut ret: Vec<((u32, u32), PathBuf)> = Vec::new();
    let dev: &Path = Path::new("/dev/");

    if dev.is_dir() {
        for entry in fs::read_dir(dev)? {
            let entry = entry?;
            if let Some(key) = parse_file_name(&entry.file_name()) {
                ret.push((key, entry.path()));
            }
        }
    }
    Ok(order_ports(ret))
}

/// Sorts ports numerically by bus, then chip select.
fn order_ports(mut ports: Vec<((u32, u32), PathBuf)>) -> Vec<PathBuf> {
    ports.sort();
    ports.into_iter().map(|(_, path)| path).collect()
}

/// Checks connection parameters against an optional clock limit.
fn validate(config: &BusConfig, limit: Option<u32>) -> Result<(), OpenError> {
    if config.speed_hz == 0 {
        Err(OpenError::InvalidSpeed(0))
    } else if config.bits_per_word != 8 {
        Err(OpenError::BitsPerWord(config.bits_per_word))
    } else {
        match limit {
            Some(limit) if config.speed_hz > limit => Err(OpenError::SpeedTooHigh {
                requested: config.speed_hz,
                limit,
            }),
            _ => Ok(()),
        }
    }
}

/// An opened but not yet connected spidev port.
pub struct Spidev {
    dev: Device,
    path: PathBuf,
    max_speed_hz: Option<u32>,
}

impl fmt::Debug for Spidev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spidev")
            .field("path", &self.path)
            .field("max_speed_hz", &self.max_speed_hz)
            .finish()
    }
}

impl Spidev {
    /// Open a port by name.
    ///
    /// An empty name selects the first port returned by [`list`].
    pub fn open(name: &str) -> Result<Spidev, OpenError> {
        if name.is_empty() {
            let path: PathBuf = list()?.into_iter().next().ok_or(OpenError::NoPort)?;
            Self::open_path(path)
        } else {
            let path: PathBuf =
                port_path(name).ok_or_else(|| OpenError::InvalidName(name.to_string()))?;
            Self::open_path(path)
        }
    }

    /// Open a port by device path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Spidev, OpenError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let dev: Device = Device::open(&path)?;
        info!(path = %path.display(), "Opened SPI port");
        Ok(Spidev {
            dev,
            path,
            max_speed_hz: None,
        })
    }

    /// Device path of the port.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set the maximum clock rate.
    ///
    /// This should be called before [`Spidev::connect`].
    pub fn limit_speed(&mut self, hz: u32) -> Result<(), OpenError> {
        if hz == 0 {
            return Err(OpenError::InvalidSpeed(hz));
        }
        self.dev
            .configure(&SpidevOptions::new().max_speed_hz(hz).build())?;
        debug!(hz, "Limited SPI clock");
        self.max_speed_hz = Some(hz);
        Ok(())
    }

    /// Apply the mode and word width and return a transfer-capable
    /// connection.
    pub fn connect(mut self, config: &BusConfig) -> Result<Connection, OpenError> {
        validate(config, self.max_speed_hz)?;
        let options = SpidevOptions::new()
            .max_speed_hz(config.speed_hz)
            .mode(mode_flags(config.mode))
            .bits_per_word(config.bits_per_word)
            .lsb_first(false)
            .build();
        self.dev.configure(&options)?;
        debug!(
            speed_hz = config.speed_hz,
            mode = ?config.mode,
            bits_per_word = config.bits_per_word,
            "Connected SPI port"
        );
        Ok(Connection {
            dev: self.dev,
            path: self.path,
            config: *config,
        })
    }
}

/// A configured spidev port.
///
/// The device is closed when this is dropped.
pub struct Connection {
    dev: Device,
    path: PathBuf,
    config: BusConfig,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

impl Connection {
    /// Device path of the port.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parameters the connection was made with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}

impl SpiBus for Connection {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        check_len(tx, rx)?;
        if tx.is_empty() {
            return Ok(());
        }
        let mut xfer = SpidevTransfer::read_write(tx, rx);
        self.dev.transfer(&mut xfer)?;
        trace!(?tx, ?rx, "SPI transfer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn parse_file_name_some() {
        assert_eq!(parse_file_name(&OsString::from("spidev0.0")), Some((0, 0)));
        assert_eq!(parse_file_name(&OsString::from("spidev1.2")), Some((1, 2)));
        assert_eq!(
            parse_file_name(&OsString::from("spidev10.1")),
            Some((10, 1))
        );
    }

    #[test]
    fn parse_file_name_none() {
        assert_eq!(parse_file_name(&OsString::from("spidev")), None);
        assert_eq!(parse_file_name(&OsString::from("spidev0")), None);
        assert_eq!(parse_file_name(&OsString::from("spidev0.x")), None);
        assert_eq!(parse_file_name(&OsString::from("hidraw0")), None);
        assert_eq!(parse_file_name(&OsString::from("i2c-1")), None);
    }

    #[test]
    fn port_names() {
        let expected = Some(PathBuf::from("/dev/spidev0.1"));
        assert_eq!(port_path("SPI0.1"), expected);
        assert_eq!(port_path("spidev0.1"), expected);
        assert_eq!(port_path("0.1"), expected);
        assert_eq!(port_path("/dev/spidev0.1"), expected);
        assert_eq!(
            port_path("/tmp/fake-spi"),
            Some(PathBuf::from("/tmp/fake-spi"))
        );
        assert_eq!(port_path("SPI"), None);
        assert_eq!(port_path("SPI0"), None);
        assert_eq!(port_path("foo.bar"), None);
    }

    #[test]
    fn ports_ordered_numerically() {
        let ports = vec![
            ((10, 0), PathBuf::from("/dev/spidev10.0")),
            ((2, 1), PathBuf::from("/dev/spidev2.1")),
            ((2, 0), PathBuf::from("/dev/spidev2.0")),
        ];
        assert_eq!(
            order_ports(ports),
            vec![
                PathBuf::from("/dev/spidev2.0"),
                PathBuf::from("/dev/spidev2.1"),
                PathBuf::from("/dev/spidev10.0"),
            ]
        );
    }

    #[test]
    fn mode_mapping() {
        assert_eq!(mode_flags(Mode::Mode0), SpiModeFlags::SPI_MODE_0);
        assert_eq!(mode_flags(Mode::Mode3), SpiModeFlags::SPI_MODE_3);
    }

    #[test]
    fn open_invalid_name() {
        match Spidev::open("not a port") {
            Err(OpenError::InvalidName(name)) => assert_eq!(name, "not a port"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn open_missing_device() {
        match Spidev::open("/dev/this-spidev-does-not-exist") {
            Err(OpenError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn configure_non_spi_device() {
        let mut port = Spidev::open_path("/dev/null").unwrap();
        assert_eq!(port.path(), Path::new("/dev/null"));
        assert!(matches!(port.limit_speed(0), Err(OpenError::InvalidSpeed(0))));
        assert!(matches!(port.limit_speed(1_000_000), Err(OpenError::Io(_))));
        assert!(matches!(
            port.connect(&BusConfig::default()),
            Err(OpenError::Io(_))
        ));
    }

    #[test]
    fn validate_config() {
        let config = BusConfig::default();
        assert!(validate(&config, None).is_ok());
        assert!(validate(&config, Some(1_000_000)).is_ok());
        assert!(matches!(
            validate(&config, Some(500_000)),
            Err(OpenError::SpeedTooHigh {
                requested: 1_000_000,
                limit: 500_000
            })
        ));
        let wide = BusConfig {
            bits_per_word: 16,
            mode: Mode::Mode3,
            ..config
        };
        assert!(matches!(validate(&wide, None), Err(OpenError::BitsPerWord(16))));
        let stopped = BusConfig {
            speed_hz: 0,
            ..config
        };
        assert!(matches!(validate(&stopped, None), Err(OpenError::InvalidSpeed(0))));
    }
}
