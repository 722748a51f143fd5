use crate::{
    crypto::{hash, hash_chunks},
    tensor::{as_bytes, compute_loss, Tensor},
};

use super::{Proof, ProofError, ProofSystem};

/// In-process proof system based on BLAKE3.
///
/// The root is the digest of all tensors in order, so it depends on their
/// order as well as their contents. The proof field is the digest of the
/// root's hex text.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashProofSystem;

impl HashProofSystem {
    pub fn new() -> Self {
        Self
    }

    fn root_of(tensors: &[Tensor]) -> String {
        hash_chunks(tensors.iter().map(|t| as_bytes(t))).to_hex()
    }

    fn proof_of(root: &str) -> String {
        hash(root.as_bytes()).to_hex()
    }
}

impl ProofSystem for HashProofSystem {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn generate_proof(&self, tensors: &[Tensor]) -> Result<Proof, ProofError> {
        let root = Self::root_of(tensors);
        let proof = Self::proof_of(&root);
        Ok(Proof::new(root, proof, compute_loss(tensors)))
    }

    fn verify_proof(&self, tensors: &[Tensor], proof: &Proof) -> bool {
        if Self::root_of(tensors) != proof.root {
            return false;
        }

        if compute_loss(tensors) != proof.loss {
            return false;
        }

        Self::proof_of(&proof.root) == proof.proof
    }
}
