//! Type definitions for the secure channel protocol

use std::fmt;

use bincode::Options;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;
use crate::transcript::TranscriptHash;

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u8 = 1;

/// Protocol identifier string, seeds every transcript
pub const PROTOCOL_ID: &str = "/pq-channel/kem-handshake/1.0.0";

pub const KEY_LEN: usize = 32;

pub const CONFIRM_TAG_LEN: usize = 32;

/// Connection identifier, unique within one [`crate::Context`]
pub type ConnectionId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    pub fn is_initiator(self) -> bool {
        self == Role::Initiator
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// Direction of traffic relative to the local peer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

/// Handshake message types
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeMessage {
    /// Initiator's opening message: variant and stage-0 public key
    Hello(HelloMessage),

    /// Responder's reply: stage-0 ciphertext, plus the stage-1 public key
    /// for hybrid variants (empty otherwise)
    KemReply(KemReplyMessage),

    /// Initiator's stage-1 ciphertext (hybrid variants only)
    KemFinish(KemFinishMessage),

    /// Key confirmation tag
    Confirm(ConfirmMessage),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Protocol version
    pub version: u8,
    /// Raw variant id; validated after decoding so unknown ids are reported
    /// as unsupported rather than malformed
    pub variant: u8,
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemReplyMessage {
    pub ciphertext: Vec<u8>,
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemFinishMessage {
    pub ciphertext: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmMessage {
    pub tag: [u8; CONFIRM_TAG_LEN],
}

fn handshake_bincode(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(limit as u64)
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

impl HandshakeMessage {
    /// Get the message type name for debugging
    pub fn message_type(&self) -> &'static str {
        match self {
            HandshakeMessage::Hello(_) => "Hello",
            HandshakeMessage::KemReply(_) => "KemReply",
            HandshakeMessage::KemFinish(_) => "KemFinish",
            HandshakeMessage::Confirm(_) => "Confirm",
        }
    }

    pub fn encode(&self, limit: usize) -> Result<Vec<u8>> {
        Ok(handshake_bincode(limit).serialize(self)?)
    }

    pub fn decode(bytes: &[u8], limit: usize) -> Result<Self> {
        Ok(handshake_bincode(limit).deserialize(bytes)?)
    }
}

/// Directional session keys and their counters.
///
/// `send_key` of one peer equals `recv_key` of the other. The whole
/// structure is wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub send_key: [u8; KEY_LEN],
    pub recv_key: [u8; KEY_LEN],
    pub send_nonce: u64,
    pub recv_nonce: u64,
    /// Key for the confirmation tags
    pub confirm_key: [u8; KEY_LEN],
    /// Public session identifier, bound into every AEAD call
    pub session_id: [u8; 32],
    /// Transcript hash the keys were derived from
    pub transcript: TranscriptHash,
    #[zeroize(skip)]
    pub role: Role,
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("role", &self.role)
            .field("session_id", &hex::encode(self.session_id))
            .field("send_nonce", &self.send_nonce)
            .field("recv_nonce", &self.recv_nonce)
            .finish_non_exhaustive()
    }
}
