//! Synchronous serial bus abstraction.

use std::io::{self, ErrorKind};

/// A bus that can exchange equal-length byte buffers.
///
/// This is implemented by [`spidev::Connection`](crate::spidev::Connection)
/// for real hardware; tests and alternative transports can provide their own.
pub trait SpiBus {
    /// Clock out `tx` while clocking in `rx`.
    ///
    /// Blocks until the transfer completes. Implementations must reject
    /// buffers of different lengths, see [`check_len`].
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()>;
}

impl<B: SpiBus + ?Sized> SpiBus for &mut B {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        (**self).transfer(tx, rx)
    }
}

impl<B: SpiBus + ?Sized> SpiBus for Box<B> {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        (**self).transfer(tx, rx)
    }
}

/// Returns an `InvalidInput` error if the buffers differ in length.
pub fn check_len(tx: &[u8], rx: &[u8]) -> io::Result<()> {
    if tx.len() != rx.len() {
        Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!(
                "transfer buffers differ in length (tx {}, rx {})",
                tx.len(),
                rx.len()
            ),
        ))
    } else {
        Ok(())
    }
}

/// SPI clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// CPOL = 0, CPHA = 0.
    Mode0,
    /// CPOL = 0, CPHA = 1.
    Mode1,
    /// CPOL = 1, CPHA = 0.
    Mode2,
    /// CPOL = 1, CPHA = 1.
    Mode3,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Mode0
    }
}

/// Connection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Clock rate in Hz.
    pub speed_hz: u32,
    /// Clock polarity and phase.
    pub mode: Mode,
    /// Word width.
    pub bits_per_word: u8,
}

impl BusConfig {
    /// 1 MHz, within the MCP3008 clock limit at 2.7V (1.35 MHz).
    pub const MCP3008_SPEED_HZ: u32 = 1_000_000;
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            speed_hz: Self::MCP3008_SPEED_HZ,
            mode: Mode::Mode0,
            bits_per_word: 8,
        }
    }
}
