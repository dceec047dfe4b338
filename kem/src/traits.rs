use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::KemError;
use crate::variant::KemAlgorithm;

pub const SHARED_SECRET_LEN: usize = 32;

/// Observer invoked after a private key has been wiped.
///
/// Receives the algorithm and the (now zeroed) key buffer. Used by tests to
/// prove that key material does not outlive its owner.
pub type WipeHook = Arc<dyn Fn(KemAlgorithm, &[u8]) + Send + Sync>;

/// Key encapsulation capability.
///
/// Implementations wrap a concrete algorithm and must run in time independent
/// of secret material. The handshake only ever sees `dyn Kem`.
pub trait Kem: Send + Sync {
    fn algorithm(&self) -> KemAlgorithm;

    fn generate_keypair(&self) -> Result<KemKeyPair, KemError>;

    fn encapsulate(&self, peer_public_key: &[u8])
        -> Result<(KemCiphertext, SharedSecret), KemError>;

    /// Recover the shared secret. A malformed ciphertext yields a
    /// pseudo-random secret instead of an error.
    fn decapsulate(&self, ciphertext: &[u8], keypair: &KemKeyPair) -> SharedSecret;
}

/// Local key pair. The private half is wiped on drop.
pub struct KemKeyPair {
    algorithm: KemAlgorithm,
    public_key: Vec<u8>,
    private_key: Vec<u8>,
    wipe_hook: Option<WipeHook>,
}

impl KemKeyPair {
    pub fn new(algorithm: KemAlgorithm, public_key: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            algorithm,
            public_key,
            private_key,
            wipe_hook: None,
        }
    }

    pub fn algorithm(&self) -> KemAlgorithm {
        self.algorithm
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    pub fn set_wipe_hook(&mut self, hook: WipeHook) {
        self.wipe_hook = Some(hook);
    }
}

impl Drop for KemKeyPair {
    fn drop(&mut self) {
        self.private_key.as_mut_slice().zeroize();
        if let Some(hook) = self.wipe_hook.take() {
            hook(self.algorithm, &self.private_key);
        }
        self.private_key.zeroize();
    }
}

impl fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct KemCiphertext(Vec<u8>);

impl KemCiphertext {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for KemCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemCiphertext({} bytes)", self.0.len())
    }
}

/// 32-byte KEM output. Consumed once by the key schedule.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub fn from_array(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Normalise raw KEM output to 32 bytes. Outputs of a different size
    /// are compressed with SHA-256.
    pub fn from_raw(raw: &[u8]) -> Self {
        let mut out = [0u8; SHARED_SECRET_LEN];
        if raw.len() == SHARED_SECRET_LEN {
            out.copy_from_slice(raw);
        } else {
            out.copy_from_slice(&Sha256::digest(raw));
        }
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}
