/// Start bit, sent in the first byte of every command.
pub const START: u8 = 0x01;
/// Single-ended mode flag, combined with the channel selector.
pub const SINGLE_ENDED: u8 = 0x08;
/// Mask for the 10-bit sample value.
pub const SAMPLE_MASK: u16 = 0x3FF;
/// Command and response frame length in bytes.
pub const FRAME_LEN: usize = 3;

/// Build a command frame.
///
/// The selector nibble (`mode | channel`) is shifted into the upper half of
/// the second byte. Only the mode flag and the low three channel bits are
/// used. The third byte is a don't-care that clocks out the rest of the
/// sample.
pub const fn command(mode: u8, channel: u8) -> [u8; FRAME_LEN] {
    [START, ((mode & SINGLE_ENDED) | (channel & 0x07)) << 4, 0x00]
}

pub const fn single_ended(channel: u8) -> [u8; FRAME_LEN] {
    command(SINGLE_ENDED, channel)
}

pub const fn pseudo_differential(channel: u8) -> [u8; FRAME_LEN] {
    command(0, channel)
}

/// Extract the sample from a response frame.
///
/// The first byte is don't-care, the two high bits of the sample sit in the
/// low bits of the second byte.
#[must_use]
pub const fn decode(rx: [u8; FRAME_LEN]) -> u16 {
    (((rx[1] as u16) << 8) | rx[2] as u16) & SAMPLE_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_ended_frames() {
        for ch in 0..8u8 {
            let frame = single_ended(ch);
            assert_eq!(frame[0], 1);
            assert_eq!(frame[1], (8 + ch) << 4);
            assert_eq!(frame[2], 0);
        }
        assert_eq!(single_ended(0), [0x01, 0x80, 0x00]);
        assert_eq!(single_ended(7), [0x01, 0xF0, 0x00]);
    }

    #[test]
    fn pseudo_differential_frames() {
        assert_eq!(pseudo_differential(0), [0x01, 0x00, 0x00]);
        assert_eq!(pseudo_differential(1), [0x01, 0x10, 0x00]);
        assert_eq!(pseudo_differential(7), [0x01, 0x70, 0x00]);
    }

    #[test]
    fn command_masks_selector() {
        assert_eq!(command(SINGLE_ENDED, 255), single_ended(7));
        assert_eq!(command(SINGLE_ENDED, 8), single_ended(0));
        assert_eq!(command(0xFF, 3), single_ended(3));
        assert_eq!(command(0x07, 250), pseudo_differential(2));
    }

    #[test]
    fn decode_values() {
        assert_eq!(decode([0x00, 0x01, 0xFF]), 511);
        assert_eq!(decode([0x00, 0x00, 0x00]), 0);
        assert_eq!(decode([0x00, 0x03, 0xFF]), 1023);
        assert_eq!(decode([0x00, 0x02, 0x00]), 512);
        // bits above the sample are ignored
        assert_eq!(decode([0xFF, 0xFC, 0x05]), 5);
    }

    #[test]
    fn decode_is_bounded() {
        for b1 in 0..=u8::MAX {
            for b2 in 0..=u8::MAX {
                let sample = decode([0xA5, b1, b2]);
                assert!(sample <= 1023, "{:#04x} {:#04x} -> {}", b1, b2, sample);
                assert_eq!(sample, ((u16::from(b1) << 8) | u16::from(b2)) & 0x3FF);
            }
        }
    }
}
