use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KemError {
    #[error("invalid public key length: expected {expected} bytes, found {actual}")]
    InvalidPublicKey { expected: usize, actual: usize },

    /// Malformed ciphertext. Decapsulation never returns this; it answers
    /// with an implicit-rejection secret instead.
    #[error("invalid ciphertext")]
    InvalidCiphertext,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encapsulation failed: {0}")]
    Encapsulation(String),

    #[error("unknown KEM variant id 0x{0:02x}")]
    UnknownVariant(u8),

    #[error("KEM algorithm {0} is not registered")]
    NotRegistered(&'static str),

    #[error("key pair belongs to {found}, expected {expected}")]
    AlgorithmMismatch {
        expected: &'static str,
        found: &'static str,
    },
}
