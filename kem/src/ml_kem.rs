use kem::{Decapsulate, Encapsulate};
use ml_kem::kem::{DecapsulationKey, EncapsulationKey};
use ml_kem::{Encoded, EncodedSizeUser, KemCore, MlKem768, MlKem768Params};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::KemError;
use crate::rejection::implicit_rejection;
use crate::traits::{Kem, KemCiphertext, KemKeyPair, SharedSecret};
use crate::variant::KemAlgorithm;

pub const ML_KEM_PUBLIC_KEY_LEN: usize = 1184;
pub const ML_KEM_SECRET_KEY_LEN: usize = 2400;
pub const ML_KEM_CIPHERTEXT_LEN: usize = 1088;

/// ML-KEM-768 backed by the RustCrypto `ml-kem` crate.
///
/// Well-formed ciphertexts get the algorithm's own implicit rejection;
/// wrong-length ones are routed through [`implicit_rejection`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MlKem768Kem;

impl Kem for MlKem768Kem {
    fn algorithm(&self) -> KemAlgorithm {
        KemAlgorithm::MlKem768
    }

    fn generate_keypair(&self) -> Result<KemKeyPair, KemError> {
        let mut rng = OsRng;
        // `dk` wipes itself on drop; the encoded copy is ours to wipe
        let (dk, ek) = MlKem768::generate(&mut rng);
        let mut encoded = dk.as_bytes();
        let private_key = encoded.to_vec();
        encoded.as_mut_slice().zeroize();
        let public_key = ek.as_bytes().to_vec();
        Ok(KemKeyPair::new(KemAlgorithm::MlKem768, public_key, private_key))
    }

    fn encapsulate(
        &self,
        peer_public_key: &[u8],
    ) -> Result<(KemCiphertext, SharedSecret), KemError> {
        let ek_bytes: &[u8; ML_KEM_PUBLIC_KEY_LEN] =
            peer_public_key
                .try_into()
                .map_err(|_| KemError::InvalidPublicKey {
                    expected: ML_KEM_PUBLIC_KEY_LEN,
                    actual: peer_public_key.len(),
                })?;
        let ek = EncapsulationKey::<MlKem768Params>::from_bytes(&(*ek_bytes).into());

        let mut rng = OsRng;
        let (ct, mut ss) = ek
            .encapsulate(&mut rng)
            .map_err(|e| KemError::Encapsulation(format!("{:?}", e)))?;
        let secret = SharedSecret::from_raw(&ss[..]);
        ss.as_mut_slice().zeroize();

        Ok((KemCiphertext::new(ct.to_vec()), secret))
    }

    fn decapsulate(&self, ciphertext: &[u8], keypair: &KemKeyPair) -> SharedSecret {
        let private_key = keypair.private_key();
        let Ok(ct_bytes) = <[u8; ML_KEM_CIPHERTEXT_LEN]>::try_from(ciphertext) else {
            return implicit_rejection(KemAlgorithm::MlKem768, private_key, ciphertext);
        };
        let Ok(mut encoded) = Encoded::<DecapsulationKey<MlKem768Params>>::try_from(private_key)
        else {
            return implicit_rejection(KemAlgorithm::MlKem768, private_key, ciphertext);
        };
        let dk = DecapsulationKey::<MlKem768Params>::from_bytes(&encoded);
        encoded.as_mut_slice().zeroize();

        match dk.decapsulate(&ct_bytes.into()) {
            Ok(mut ss) => {
                let secret = SharedSecret::from_raw(&ss[..]);
                ss.as_mut_slice().zeroize();
                secret
            }
            Err(_) => implicit_rejection(KemAlgorithm::MlKem768, private_key, ciphertext),
        }
    }
}
