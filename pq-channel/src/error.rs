//! Error types for the secure channel

use thiserror::Error;

/// Errors that terminate a handshake, session, or connection.
///
/// Every variant except [`ChannelError::Busy`] and
/// [`ChannelError::InvalidConfig`] is fatal for the connection it occurs on
/// and never for any other.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Message arrived in the wrong phase, or could not be parsed
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A handshake phase exceeded its deadline
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Peer asked for a KEM variant we do not offer
    #[error("unsupported KEM variant 0x{0:02x}")]
    UnsupportedAlgorithm(u8),

    /// Declared frame length exceeds the configured bound
    #[error("frame of {declared} bytes exceeds limit of {max}")]
    FrameTooLarge { declared: usize, max: usize },

    /// Integrity check failed on an established session
    #[error("frame failed integrity check")]
    TamperedFrame,

    /// Key confirmation did not match the local transcript
    #[error("handshake transcript mismatch")]
    TranscriptMismatch,

    /// Nonce space exhausted and re-keying is not possible
    #[error("nonce counter exhausted")]
    NonceExhausted,

    /// Cancelled by the owner
    #[error("operation cancelled")]
    Cancelled,

    /// Channel already closed or failed
    #[error("channel closed")]
    Closed,

    /// Context still has live connections
    #[error("context has {0} live connections")]
    Busy(usize),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// KEM capability failure (bad public key, unregistered algorithm)
    #[error("kem error: {0}")]
    Kem(#[from] kem::KemError),

    /// I/O error on the underlying socket
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ChannelError::ProtocolViolation(msg.into())
    }

    /// Whether the error tears down the connection it occurred on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::Busy(_) | ChannelError::InvalidConfig(_))
    }
}

// io::Error is not Clone; the copy keeps its kind and message
impl Clone for ChannelError {
    fn clone(&self) -> Self {
        match self {
            ChannelError::ProtocolViolation(msg) => ChannelError::ProtocolViolation(msg.clone()),
            ChannelError::HandshakeTimeout => ChannelError::HandshakeTimeout,
            ChannelError::UnsupportedAlgorithm(id) => ChannelError::UnsupportedAlgorithm(*id),
            ChannelError::FrameTooLarge { declared, max } => ChannelError::FrameTooLarge {
                declared: *declared,
                max: *max,
            },
            ChannelError::TamperedFrame => ChannelError::TamperedFrame,
            ChannelError::TranscriptMismatch => ChannelError::TranscriptMismatch,
            ChannelError::NonceExhausted => ChannelError::NonceExhausted,
            ChannelError::Cancelled => ChannelError::Cancelled,
            ChannelError::Closed => ChannelError::Closed,
            ChannelError::Busy(n) => ChannelError::Busy(*n),
            ChannelError::InvalidConfig(msg) => ChannelError::InvalidConfig(msg.clone()),
            ChannelError::Kem(e) => ChannelError::Kem(e.clone()),
            ChannelError::Io(e) => ChannelError::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

impl From<bincode::Error> for ChannelError {
    fn from(e: bincode::Error) -> Self {
        ChannelError::ProtocolViolation(format!("malformed message: {}", e))
    }
}

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;
