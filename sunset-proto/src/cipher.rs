//! Payload encryption
//!
//! The lamp decrypts every frame with AES-128 in ECB mode under one key
//! baked into its firmware. There is no IV or nonce: the same frame always
//! encrypts to the same payload, and the lamp rejects anything else.

use aes::{Aes128, Block};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::{CommandFrame, FRAME_LEN, ProtoError};

/// Firmware key. Public knowledge, lifted from the vendor app.
pub const KEY: [u8; 16] = [
    0x34, 0x52, 0x2A, 0x5B, 0x7A, 0x6E, 0x49, 0x2C,
    0x08, 0x09, 0x0A, 0x9D, 0x8D, 0x2A, 0x23, 0xF8,
];

/// One encrypted command frame, ready to be written to the lamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptedFrame([u8; FRAME_LEN]);

impl EncryptedFrame {
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        crate::to_hex(&self.0)
    }
}

/// AES-128-ECB over single frames under [`KEY`]
#[derive(Clone)]
pub struct CipherBox {
    cipher: Aes128,
}

impl Default for CipherBox {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherBox {
    pub fn new() -> Self {
        Self { cipher: Aes128::new(&KEY.into()) }
    }

    pub fn encrypt(&self, frame: &CommandFrame) -> EncryptedFrame {
        let mut block = Block::from(*frame.as_bytes());
        self.cipher.encrypt_block(&mut block);
        EncryptedFrame(to_array(&block))
    }

    /// Reverse of [`CipherBox::encrypt`]. Fails if the plaintext is not a
    /// well-formed frame, which usually means the payload came from a
    /// different device.
    pub fn decrypt(&self, payload: &EncryptedFrame) -> Result<CommandFrame, ProtoError> {
        let mut block = Block::from(payload.0);
        self.cipher.decrypt_block(&mut block);
        CommandFrame::from_bytes(to_array(&block))
    }
}

fn to_array(block: &Block) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out.copy_from_slice(block);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Brightness, Color, Speed, encode_rgb_frame};

    fn frame(r: u8, g: u8, b: u8) -> CommandFrame {
        encode_rgb_frame(Color::new(r, g, b), Brightness::new(50), Speed::MAX)
    }

    #[test]
    fn encryption_is_deterministic() {
        let cipher = CipherBox::new();
        let a = cipher.encrypt(&frame(255, 0, 128));
        let b = CipherBox::new().encrypt(&frame(255, 0, 128));
        assert_eq!(a, b);
    }

    #[test]
    fn one_byte_changes_the_whole_block() {
        let cipher = CipherBox::new();
        let a = cipher.encrypt(&frame(255, 0, 128));
        let b = cipher.encrypt(&frame(255, 0, 129));
        assert_ne!(a, b);
        let differing = a.as_bytes().iter().zip(b.as_bytes()).filter(|(x, y)| x != y).count();
        assert!(differing > 4, "only {differing} bytes differ");
    }

    #[test]
    fn decrypt_recovers_plaintext() {
        let cipher = CipherBox::new();
        for original in [frame(0, 0, 0), frame(255, 255, 255), frame(12, 200, 7)] {
            let payload = cipher.encrypt(&original);
            assert_ne!(payload.as_bytes(), original.as_bytes());
            assert_eq!(cipher.decrypt(&payload), Ok(original));
        }
    }

    #[test]
    fn decrypt_rejects_garbage() {
        let cipher = CipherBox::new();
        let garbage = EncryptedFrame::from_bytes([0xAA; FRAME_LEN]);
        assert!(cipher.decrypt(&garbage).is_err());
    }
}
