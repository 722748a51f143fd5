use parking_lot::Mutex;
use std::collections::HashMap;

use super::Proof;

/// Thread-safe local memory of proofs, keyed by root. Nothing is evicted.
#[derive(Default)]
pub struct ProofStore {
    proofs: Mutex<HashMap<String, Proof>>,
}

impl ProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a proof, replacing any previous one with the same root.
    /// Returns true if the root was not known before.
    pub fn insert(&self, proof: Proof) -> bool {
        self.proofs.lock().insert(proof.root.clone(), proof).is_none()
    }

    pub fn get(&self, root: &str) -> Option<Proof> {
        self.proofs.lock().get(root).cloned()
    }

    pub fn contains(&self, root: &str) -> bool {
        self.proofs.lock().contains_key(root)
    }

    /// Snapshot of every stored proof
    pub fn all(&self) -> Vec<Proof> {
        self.proofs.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.proofs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.lock().is_empty()
    }
}
