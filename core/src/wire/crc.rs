// Checksum for smart-timer state frames.

use crc_all::CrcAlgo;

const CRC16_INIT: u16 = 0xFFFF;

const CRC16: CrcAlgo<u16> = CrcAlgo::<u16>::new(
    0x1021,     // polynomial (CRC-16/CCITT-FALSE)
    16,         // width
    CRC16_INIT, // init
    0,          // xorout
    false,      // reflect
);

/// CRC-16/CCITT-FALSE over `data`.
///
/// The timer transmits this little-endian in the last two bytes of every
/// state frame, computed over the frame body between the two-byte prefix
/// and the checksum itself.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    CRC16.update_crc(&mut crc, data);
    CRC16.finish_crc(&crc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Standard check input for CRC-16/CCITT-FALSE.
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_input_is_init() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_single_bit_difference_changes_crc() {
        assert_ne!(crc16(&[0x00, 0x01]), crc16(&[0x00, 0x00]));
    }
}
