//! Algorithm and negotiated-variant identifiers

use std::fmt;

use crate::error::KemError;

/// A single KEM algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum KemAlgorithm {
    /// Module-lattice KEM, FIPS 203 parameter set 768
    MlKem768 = 0x01,
    /// Classic McEliece 348864 (code-based)
    McEliece348864 = 0x02,
    /// NTRU-HPS-2048-509
    NtruHps2048509 = 0x03,
}

impl KemAlgorithm {
    pub const ALL: [KemAlgorithm; 3] = [
        KemAlgorithm::MlKem768,
        KemAlgorithm::McEliece348864,
        KemAlgorithm::NtruHps2048509,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            KemAlgorithm::MlKem768 => "ML-KEM-768",
            KemAlgorithm::McEliece348864 => "Classic-McEliece-348864",
            KemAlgorithm::NtruHps2048509 => "NTRU-HPS-2048-509",
        }
    }
}

impl fmt::Display for KemAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key-agreement variant negotiated in the first handshake message.
///
/// Single variants run one KEM round trip. Hybrid variants add a second
/// stage in the opposite direction, so the session keys depend on two
/// independent KEM families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KemVariant {
    MlKem768 = 0x01,
    McEliece348864 = 0x02,
    NtruHps2048509 = 0x03,
    HybridMlKemNtru = 0x11,
    HybridMlKemMcEliece = 0x12,
}

impl KemVariant {
    pub const ALL: [KemVariant; 5] = [
        KemVariant::MlKem768,
        KemVariant::McEliece348864,
        KemVariant::NtruHps2048509,
        KemVariant::HybridMlKemNtru,
        KemVariant::HybridMlKemMcEliece,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Result<Self, KemError> {
        Self::ALL
            .into_iter()
            .find(|v| v.id() == id)
            .ok_or(KemError::UnknownVariant(id))
    }

    /// Algorithm used at each KEM stage, in handshake order.
    ///
    /// Stage 0 encapsulates to the initiator's key, stage 1 to the responder's.
    pub fn stages(self) -> &'static [KemAlgorithm] {
        match self {
            KemVariant::MlKem768 => &[KemAlgorithm::MlKem768],
            KemVariant::McEliece348864 => &[KemAlgorithm::McEliece348864],
            KemVariant::NtruHps2048509 => &[KemAlgorithm::NtruHps2048509],
            KemVariant::HybridMlKemNtru => {
                &[KemAlgorithm::MlKem768, KemAlgorithm::NtruHps2048509]
            }
            KemVariant::HybridMlKemMcEliece => {
                &[KemAlgorithm::MlKem768, KemAlgorithm::McEliece348864]
            }
        }
    }

    pub fn is_hybrid(self) -> bool {
        self.stages().len() > 1
    }

    pub fn name(self) -> &'static str {
        match self {
            KemVariant::MlKem768 => "ml-kem-768",
            KemVariant::McEliece348864 => "mceliece-348864",
            KemVariant::NtruHps2048509 => "ntru-hps-2048-509",
            KemVariant::HybridMlKemNtru => "hybrid-ml-kem-768+ntru-hps-2048-509",
            KemVariant::HybridMlKemMcEliece => "hybrid-ml-kem-768+mceliece-348864",
        }
    }
}

impl fmt::Display for KemVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for KemVariant {
    type Error = KemError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id)
    }
}
