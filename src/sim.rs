//! Simulated MCP3008 for tests.

use std::io::{self, ErrorKind};

use tokio::sync::oneshot;

use crate::{
    bus::{check_len, SpiBus},
    cmd, Channel, CHANNEL_COUNT,
};

/// Answers command frames the way the chip does.
///
/// The upper bits of the second response byte are left floating (set) to
/// make sure they are masked off.
#[derive(Debug)]
pub(crate) struct SimulatedAdc {
    values: [u16; CHANNEL_COUNT],
    raw: [Option<[u8; cmd::FRAME_LEN]>; CHANNEL_COUNT],
    fail_channel: Option<u8>,
    failures_left: usize,
    sets_until_stop: Option<(usize, oneshot::Sender<()>)>,
    /// Every command frame received, in order.
    pub frames: Vec<[u8; cmd::FRAME_LEN]>,
}

impl SimulatedAdc {
    pub fn new(values: [u16; CHANNEL_COUNT]) -> Self {
        SimulatedAdc {
            values,
            raw: [None; CHANNEL_COUNT],
            fail_channel: None,
            failures_left: 0,
            sets_until_stop: None,
            frames: Vec::new(),
        }
    }

    /// Reply with a fixed response frame for a channel.
    pub fn respond_raw(&mut self, channel: Channel, rx: [u8; cmd::FRAME_LEN]) {
        self.raw[usize::from(channel.idx())] = Some(rx);
    }

    /// Fail every transfer to a channel.
    pub fn fail_on(&mut self, channel: Channel) {
        self.fail_times(channel, usize::MAX);
    }

    /// Fail the next `times` transfers to a channel.
    pub fn fail_times(&mut self, channel: Channel, times: usize) {
        self.fail_channel = Some(channel.idx());
        self.failures_left = times;
    }

    /// Fire `tx` once `sets` complete reading sets have been answered.
    pub fn stop_after(&mut self, sets: usize, tx: oneshot::Sender<()>) {
        self.sets_until_stop = Some((sets, tx));
    }

    /// Channel numbers of the frames received, in order.
    pub fn channels(&self) -> Vec<u8> {
        self.frames.iter().map(|frame| (frame[1] >> 4) & 0x07).collect()
    }
}

impl SpiBus for SimulatedAdc {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        check_len(tx, rx)?;
        if tx.len() != cmd::FRAME_LEN || tx[0] != cmd::START {
            return Err(io::Error::new(ErrorKind::InvalidData, "not a command frame"));
        }
        self.frames.push([tx[0], tx[1], tx[2]]);
        let channel: u8 = (tx[1] >> 4) & 0x07;

        if self.fail_channel == Some(channel) && self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(io::Error::new(ErrorKind::BrokenPipe, "simulated bus fault"));
        }

        let response: [u8; cmd::FRAME_LEN] = match self.raw[usize::from(channel)] {
            Some(raw) => raw,
            None => {
                let value: u16 = self.values[usize::from(channel)];
                [0xFF, 0xF8 | (value >> 8) as u8, value as u8]
            }
        };
        rx.copy_from_slice(&response);

        if usize::from(channel) == CHANNEL_COUNT - 1 {
            let done: bool = match self.sets_until_stop.as_mut() {
                Some((sets, _)) => {
                    *sets = sets.saturating_sub(1);
                    *sets == 0
                }
                None => false,
            };
            if done {
                if let Some((_, tx)) = self.sets_until_stop.take() {
                    let _ = tx.send(());
                }
            }
        }
        Ok(())
    }
}
