// gancube-core — protocol stack for GAN-branded BLE smart devices
//
// "Does this turn an encrypted notification frame into a typed event
//  a timing app can trust?"
//
// Everything else (scanning, pairing, UI) lives outside this crate.

pub mod crypto;
pub mod cube;
pub mod event;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod wire;

use thiserror::Error;

pub use crypto::{AesCbcEnvelope, KeyPair};
pub use cube::facelets::CubeState;
pub use event::{Command, DeviceEvent};
pub use protocol::{driver_for, Driver, DriverOutput};
pub use session::Session;
pub use transport::{Generation, Transport};

/// Errors surfaced by the protocol stack.
///
/// Frame-level rejections (bad magic, bad CRC, undersized AES input) are
/// deliberately non-fatal: the session drops the offending frame and keeps
/// running. They only appear as `Err` values when callers decode buffers
/// directly.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport failure: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("frame rejected: {0}")]
    FrameRejected(&'static str),

    #[error("session already disconnected")]
    Disconnected,
}
