//! Transport abstraction for GATT-connected devices.
//!
//! The core never touches BLE directly: scanning, pairing and the GATT
//! plumbing are injected behind [`Transport`]. This module also carries
//! the static GATT profile table used to detect which protocol generation
//! a connected device speaks.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::{uuid, Uuid};

/// Errors from the injected transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("notification subscription failed: {0}")]
    SubscribeFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("invalid device address: {0}")]
    InvalidAddress(String),
}

/// A connected GATT device, reduced to the three operations the protocol
/// stack needs.
///
/// Implementations wrap a platform BLE stack; tests use a scripted mock.
/// The session owns its transport exclusively.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one frame to the device's command characteristic.
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to the state characteristic. The stream ends when the
    /// device drops the connection.
    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>, TransportError>;

    /// Tear the link down. Must be safe to call more than once.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Protocol generation, keyed by which GATT service the device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    Gen2,
    Gen3,
    Gen4,
    Timer,
}

/// GATT service and characteristic UUIDs for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattProfile {
    pub service: Uuid,
    pub command: Uuid,
    pub state: Uuid,
}

pub const GEN2_PROFILE: GattProfile = GattProfile {
    service: uuid!("6e400001-b5a3-f393-e0a9-e50e24dc4179"),
    command: uuid!("28be4a4a-cd67-11e9-a32f-2a2ae2dbcce4"),
    state: uuid!("28be4cb6-cd67-11e9-a32f-2a2ae2dbcce4"),
};

pub const GEN3_PROFILE: GattProfile = GattProfile {
    service: uuid!("8653000a-43e6-47b7-9cb0-5fc21d4ae340"),
    command: uuid!("8653000c-43e6-47b7-9cb0-5fc21d4ae340"),
    state: uuid!("8653000b-43e6-47b7-9cb0-5fc21d4ae340"),
};

pub const GEN4_PROFILE: GattProfile = GattProfile {
    service: uuid!("00000010-0000-fff7-fff6-fff5fff4fff0"),
    command: uuid!("0000fff5-0000-1000-8000-00805f9b34fb"),
    state: uuid!("0000fff6-0000-1000-8000-00805f9b34fb"),
};

/// The timer additionally serves recorded times on a readable
/// characteristic, decoded by
/// [`decode_recorded_times`](crate::protocol::timer::decode_recorded_times).
pub const TIMER_PROFILE: GattProfile = GattProfile {
    service: uuid!("0000fff0-0000-1000-8000-00805f9b34fb"),
    command: uuid!("0000fff1-0000-1000-8000-00805f9b34fb"),
    state: uuid!("0000fff5-0000-1000-8000-00805f9b34fb"),
};

/// Readable characteristic with the 16-byte recorded-times blob.
pub const TIMER_TIME_CHARACTERISTIC: Uuid = uuid!("0000fff2-0000-1000-8000-00805f9b34fb");

impl Generation {
    pub fn profile(self) -> GattProfile {
        match self {
            Generation::Gen2 => GEN2_PROFILE,
            Generation::Gen3 => GEN3_PROFILE,
            Generation::Gen4 => GEN4_PROFILE,
            Generation::Timer => TIMER_PROFILE,
        }
    }

    /// Whether this generation wraps frames in the AES envelope. Timer
    /// frames are plaintext with a CRC instead.
    pub fn encrypted(self) -> bool {
        !matches!(self, Generation::Timer)
    }

    /// Detect the generation from the services a device advertises.
    pub fn detect(services: &[Uuid]) -> Option<Self> {
        [
            Generation::Gen2,
            Generation::Gen3,
            Generation::Gen4,
            Generation::Timer,
        ]
        .into_iter()
        .find(|generation| services.contains(&generation.profile().service))
    }

    /// Whether an advertised device name looks like a supported device.
    pub fn name_is_supported(name: &str) -> bool {
        ["GAN", "MG", "AiCube"]
            .iter()
            .any(|prefix| name.starts_with(prefix))
    }
}

/// Parse a `AB:12:34:5C:DE:F0` MAC address into the 6-byte AES salt.
///
/// The firmware folds the address into the key in reverse byte order, so
/// the salt is the MAC reversed.
pub fn mac_to_salt(mac: &str) -> Result<[u8; 6], TransportError> {
    let bytes: Vec<u8> = mac
        .split(':')
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<Result<_, _>>()
        .map_err(|_| TransportError::InvalidAddress(mac.to_string()))?;
    let bytes: [u8; 6] = bytes
        .try_into()
        .map_err(|_| TransportError::InvalidAddress(mac.to_string()))?;
    let mut salt = [0u8; 6];
    for (i, byte) in bytes.iter().rev().enumerate() {
        salt[i] = *byte;
    }
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_detection() {
        assert_eq!(
            Generation::detect(&[GEN3_PROFILE.service]),
            Some(Generation::Gen3)
        );
        assert_eq!(
            Generation::detect(&[Uuid::nil(), GEN4_PROFILE.service]),
            Some(Generation::Gen4)
        );
        assert_eq!(Generation::detect(&[Uuid::nil()]), None);
    }

    #[test]
    fn test_timer_is_plaintext() {
        assert!(!Generation::Timer.encrypted());
        assert!(Generation::Gen2.encrypted());
    }

    #[test]
    fn test_name_detection() {
        assert!(Generation::name_is_supported("GAN12uiM"));
        assert!(Generation::name_is_supported("MG_2AI"));
        assert!(Generation::name_is_supported("AiCube_01"));
        assert!(!Generation::name_is_supported("QY-Cube"));
    }

    #[test]
    fn test_mac_salt_reversed() {
        let salt = mac_to_salt("AB:12:34:5C:DE:F0").unwrap();
        assert_eq!(salt, [0xF0, 0xDE, 0x5C, 0x34, 0x12, 0xAB]);
    }

    #[test]
    fn test_mac_salt_rejects_garbage() {
        assert!(mac_to_salt("not-a-mac").is_err());
        assert!(mac_to_salt("AB:12:34").is_err());
        assert!(mac_to_salt("AB:12:34:5C:DE:ZZ").is_err());
    }
}
