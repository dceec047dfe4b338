use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::KemError;
use crate::ml_kem::MlKem768Kem;
use crate::pqclean::{McEliece348864Kem, NtruHps2048509Kem};
use crate::traits::Kem;
use crate::variant::{KemAlgorithm, KemVariant};

/// Algorithm id → capability table consulted during negotiation.
#[derive(Clone)]
pub struct KemRegistry {
    kems: BTreeMap<KemAlgorithm, Arc<dyn Kem>>,
}

impl KemRegistry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            kems: BTreeMap::new(),
        }
    }

    /// All built-in algorithms.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(MlKem768Kem));
        registry.register(Arc::new(McEliece348864Kem));
        registry.register(Arc::new(NtruHps2048509Kem));
        registry
    }

    /// Install (or replace) the implementation for `kem.algorithm()`.
    pub fn register(&mut self, kem: Arc<dyn Kem>) -> &mut Self {
        self.kems.insert(kem.algorithm(), kem);
        self
    }

    pub fn get(&self, algorithm: KemAlgorithm) -> Result<Arc<dyn Kem>, KemError> {
        self.kems
            .get(&algorithm)
            .cloned()
            .ok_or(KemError::NotRegistered(algorithm.name()))
    }

    /// Resolve every stage of a variant, in stage order.
    pub fn resolve(&self, variant: KemVariant) -> Result<Vec<Arc<dyn Kem>>, KemError> {
        variant.stages().iter().map(|alg| self.get(*alg)).collect()
    }

    pub fn supports(&self, variant: KemVariant) -> bool {
        variant
            .stages()
            .iter()
            .all(|alg| self.kems.contains_key(alg))
    }

    pub fn algorithms(&self) -> impl Iterator<Item = KemAlgorithm> + '_ {
        self.kems.keys().copied()
    }
}

impl Default for KemRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for KemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kems.keys()).finish()
    }
}
