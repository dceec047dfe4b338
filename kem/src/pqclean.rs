//! Code-based and NTRU adapters over the PQClean bindings

use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};

use crate::error::KemError;
use crate::rejection::implicit_rejection;
use crate::traits::{Kem, KemCiphertext, KemKeyPair, SharedSecret};
use crate::variant::KemAlgorithm;

macro_rules! pqclean_kem {
    ($(#[$meta:meta])* $name:ident, $($module:ident)::+, $algorithm:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $name;

        impl Kem for $name {
            fn algorithm(&self) -> KemAlgorithm {
                $algorithm
            }

            fn generate_keypair(&self) -> Result<KemKeyPair, KemError> {
                use $($module)::+ as imp;
                let (pk, sk) = imp::keypair();
                Ok(KemKeyPair::new(
                    $algorithm,
                    pk.as_bytes().to_vec(),
                    sk.as_bytes().to_vec(),
                ))
            }

            fn encapsulate(
                &self,
                peer_public_key: &[u8],
            ) -> Result<(KemCiphertext, SharedSecret), KemError> {
                use $($module)::+ as imp;
                let pk = imp::PublicKey::from_bytes(peer_public_key).map_err(|_| {
                    KemError::InvalidPublicKey {
                        expected: imp::public_key_bytes(),
                        actual: peer_public_key.len(),
                    }
                })?;
                let (ss, ct) = imp::encapsulate(&pk);
                Ok((
                    KemCiphertext::new(ct.as_bytes().to_vec()),
                    SharedSecret::from_raw(ss.as_bytes()),
                ))
            }

            fn decapsulate(&self, ciphertext: &[u8], keypair: &KemKeyPair) -> SharedSecret {
                use $($module)::+ as imp;
                let private_key = keypair.private_key();
                let (Ok(ct), Ok(sk)) = (
                    imp::Ciphertext::from_bytes(ciphertext),
                    imp::SecretKey::from_bytes(private_key),
                ) else {
                    return implicit_rejection($algorithm, private_key, ciphertext);
                };
                let ss = imp::decapsulate(&ct, &sk);
                SharedSecret::from_raw(ss.as_bytes())
            }
        }
    };
}

pqclean_kem!(
    /// Classic McEliece 348864. Public keys are ~255 KiB.
    McEliece348864Kem,
    pqcrypto_classicmceliece::mceliece348864,
    KemAlgorithm::McEliece348864
);

pqclean_kem!(
    /// NTRU-HPS-2048-509.
    NtruHps2048509Kem,
    pqcrypto_ntru::ntruhps2048509,
    KemAlgorithm::NtruHps2048509
);
