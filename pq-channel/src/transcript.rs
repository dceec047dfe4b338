//! Running handshake transcript

use sha2::{Digest, Sha256};

use crate::types::PROTOCOL_ID;

pub const TRANSCRIPT_HASH_LEN: usize = 32;

pub type TranscriptHash = [u8; TRANSCRIPT_HASH_LEN];

/// SHA-256 over every handshake message in the order both peers agree on.
///
/// Messages are absorbed length-prefixed, so message boundaries are part of
/// the digest.
#[derive(Clone)]
pub struct Transcript {
    hasher: Sha256,
}

impl Transcript {
    pub fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(PROTOCOL_ID.as_bytes());
        Self { hasher }
    }

    /// Absorb one message exactly as it appeared on the wire.
    pub fn absorb(&mut self, message: &[u8]) {
        self.hasher.update((message.len() as u32).to_be_bytes());
        self.hasher.update(message);
    }

    /// Current digest; the transcript stays usable.
    pub fn hash(&self) -> TranscriptHash {
        self.hasher.clone().finalize().into()
    }

    pub fn finalize(self) -> TranscriptHash {
        self.hasher.finalize().into()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
