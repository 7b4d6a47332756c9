// AES envelope for cube frames.
//
// Frames are variable length but always at least one AES block. The
// firmware encrypts the first 16 bytes and, when the frame is longer, the
// *last* 16 bytes with the same fresh IV — for frames between 17 and 31
// bytes the two chunks overlap, and decryption must undo them in reverse
// order (tail first, then head).

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};

use super::KeyPair;
use crate::ProtocolError;

const BLOCK: usize = 16;

/// Per-device AES-128 envelope.
///
/// The effective key and IV are the fixed pair with the 6-byte device salt
/// (MAC address in reverse byte order) folded in, see [`KeyPair::salted`].
#[derive(Clone)]
pub struct AesCbcEnvelope {
    cipher: Aes128,
    iv: [u8; 16],
}

impl AesCbcEnvelope {
    pub fn new(pair: &KeyPair, salt: &[u8; 6]) -> Self {
        let salted = pair.salted(salt);
        Self {
            cipher: Aes128::new(GenericArray::from_slice(&salted.key)),
            iv: salted.iv,
        }
    }

    /// Encrypt a frame in the firmware's double-chunk scheme.
    pub fn encrypt(&self, frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if frame.len() < BLOCK {
            return Err(ProtocolError::FrameRejected("frame shorter than one AES block"));
        }

        let mut buf = frame.to_vec();
        self.encrypt_chunk(&mut buf, 0);
        if buf.len() > BLOCK {
            let offset = buf.len() - BLOCK;
            self.encrypt_chunk(&mut buf, offset);
        }
        Ok(buf)
    }

    /// Decrypt a frame; chunks are undone in reverse order of encryption.
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if frame.len() < BLOCK {
            return Err(ProtocolError::FrameRejected("frame shorter than one AES block"));
        }

        let mut buf = frame.to_vec();
        if buf.len() > BLOCK {
            let offset = buf.len() - BLOCK;
            self.decrypt_chunk(&mut buf, offset);
        }
        self.decrypt_chunk(&mut buf, 0);
        Ok(buf)
    }

    // Single-block CBC with a fresh IV: XOR the IV in, then one AES round.
    fn encrypt_chunk(&self, buf: &mut [u8], offset: usize) {
        let chunk = &mut buf[offset..offset + BLOCK];
        for (byte, iv) in chunk.iter_mut().zip(self.iv.iter()) {
            *byte ^= iv;
        }
        let mut block = Block::clone_from_slice(chunk);
        self.cipher.encrypt_block(&mut block);
        chunk.copy_from_slice(&block);
    }

    fn decrypt_chunk(&self, buf: &mut [u8], offset: usize) {
        let mut block = Block::clone_from_slice(&buf[offset..offset + BLOCK]);
        self.cipher.decrypt_block(&mut block);
        let chunk = &mut buf[offset..offset + BLOCK];
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = block[i] ^ self.iv[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::GAN_KEY;

    fn envelope() -> AesCbcEnvelope {
        AesCbcEnvelope::new(&GAN_KEY, &[0xAB, 0x12, 0x34, 0x42, 0xCD, 0x00])
    }

    #[test]
    fn test_roundtrip_all_lengths() {
        let envelope = envelope();
        for n in 16..=64 {
            let frame: Vec<u8> = (0..n as u8).collect();
            let encrypted = envelope.encrypt(&frame).unwrap();
            assert_eq!(encrypted.len(), frame.len());
            assert_ne!(encrypted, frame);
            let decrypted = envelope.decrypt(&encrypted).unwrap();
            assert_eq!(decrypted, frame, "length {n}");
        }
    }

    #[test]
    fn test_overlapping_chunks_roundtrip() {
        // 17..31 bytes: head and tail chunks share bytes.
        let envelope = envelope();
        let frame = vec![0x5A; 20];
        let decrypted = envelope.decrypt(&envelope.encrypt(&frame).unwrap()).unwrap();
        assert_eq!(decrypted, frame);
    }

    #[test]
    fn test_short_frame_rejected() {
        let envelope = envelope();
        assert!(envelope.encrypt(&[0u8; 15]).is_err());
        assert!(envelope.decrypt(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_salt_changes_ciphertext() {
        let a = AesCbcEnvelope::new(&GAN_KEY, &[1, 2, 3, 4, 5, 6]);
        let b = AesCbcEnvelope::new(&GAN_KEY, &[6, 5, 4, 3, 2, 1]);
        let frame = [0x11u8; 16];
        assert_ne!(a.encrypt(&frame).unwrap(), b.encrypt(&frame).unwrap());
    }

    #[test]
    fn test_salt_fold_uses_modulus_255() {
        // key[0] = 0x01 plus salt 0xFE is exactly 255, which the firmware
        // wraps to zero; modulus 256 would leave 255. Encrypt the same frame
        // under a manually folded key to pin the behavior.
        let mut folded = GAN_KEY;
        folded.key[0] = 0;
        folded.iv[0] = ((folded.iv[0] as u16 + 0xFE) % 255) as u8;
        let salted = AesCbcEnvelope::new(&GAN_KEY, &[0xFE, 0, 0, 0, 0, 0]);
        let manual = AesCbcEnvelope::new(&folded, &[0; 6]);
        let frame = [0x22u8; 18];
        assert_eq!(
            salted.encrypt(&frame).unwrap(),
            manual.encrypt(&frame).unwrap()
        );
    }
}
