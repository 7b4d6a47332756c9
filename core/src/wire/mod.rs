// Wire-level primitives shared by every driver: the bit-addressed frame
// view and the timer checksum.

pub mod bits;
pub mod crc;

pub use bits::BitView;
pub use crc::crc16;
