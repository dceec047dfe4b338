//! Post-quantum key encapsulation capability
//!
//! A single object-safe [`Kem`] trait over interchangeable algorithm
//! families, selected at runtime through a [`KemRegistry`] by the variant
//! identifier negotiated on the wire.

pub mod error;
pub mod ml_kem;
pub mod pqclean;
pub mod registry;
pub mod rejection;
pub mod traits;
pub mod variant;

pub use error::KemError;
pub use registry::KemRegistry;
pub use traits::{Kem, KemCiphertext, KemKeyPair, SharedSecret, WipeHook, SHARED_SECRET_LEN};
pub use variant::{KemAlgorithm, KemVariant};
