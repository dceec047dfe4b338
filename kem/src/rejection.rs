//! Implicit rejection for malformed ciphertexts

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::traits::{SharedSecret, SHARED_SECRET_LEN};
use crate::variant::KemAlgorithm;

const REJECTION_SALT: &[u8] = b"pq-kem-implicit-rejection-v1";

/// Deterministic pseudo-random secret bound to the private key and the
/// rejected ciphertext.
///
/// Both inputs are fed through HKDF regardless of their content so the
/// rejection path costs the same as any other derivation.
pub fn implicit_rejection(
    algorithm: KemAlgorithm,
    private_key: &[u8],
    ciphertext: &[u8],
) -> SharedSecret {
    let hk = Hkdf::<Sha256>::new(Some(REJECTION_SALT), private_key);
    let mut info = Vec::with_capacity(1 + ciphertext.len());
    info.push(algorithm.id());
    info.extend_from_slice(ciphertext);

    let mut okm = [0u8; SHARED_SECRET_LEN];
    // 32 bytes is always a valid HKDF-SHA256 output length
    let _ = hk.expand(&info, &mut okm);
    let secret = SharedSecret::from_array(okm);
    okm.zeroize();
    secret
}
