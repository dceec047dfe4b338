//! AES-256-GCM primitives for sealed frames

use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::{ChannelError, Result};
use crate::types::KEY_LEN;

/// Authentication tag appended to every ciphertext
pub const TAG_LEN: usize = 16;

/// One direction of an established session.
///
/// Counters are owned by [`crate::types::SessionKeys`]; the cipher only
/// turns a counter into a nonce.
pub struct DirectionalCipher {
    cipher: Aes256Gcm,
}

impl DirectionalCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| ChannelError::protocol(format!("failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` under the nonce for `counter`
    pub fn seal(&self, counter: u64, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes = nonce_from_counter(counter);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        self.cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|_| ChannelError::protocol("encryption failed"))
    }

    /// Decrypt and verify; any failure is [`ChannelError::TamperedFrame`]
    pub fn open(&self, counter: u64, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes = nonce_from_counter(counter);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        self.cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|_| ChannelError::TamperedFrame)
    }
}

/// Convert a u64 counter to a 12-byte nonce for AES-GCM
pub fn nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    // Put counter in the last 8 bytes (big-endian)
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}
