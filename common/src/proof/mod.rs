//! Content-addressed proofs over INT8 tensors.
//!
//! A [`ProofSystem`] turns a sequence of tensors into a [`Proof`] whose `root`
//! identifies the tensors, and checks a proof against tensors. Two backends
//! exist: [`HashProofSystem`] which hashes in-process, and
//! [`PluginProofSystem`] which calls into an external prover library.

mod hash_system;
mod store;

pub mod plugin;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use crate::tensor::Tensor;

pub use hash_system::HashProofSystem;
pub use plugin::{DynamicProver, ExternalProver, PluginError, PluginProofSystem};
pub use store::ProofStore;

/// A proof over a set of tensors, identified by its `root`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    /// Content-derived identifier (hex encoded digest)
    pub root: String,
    /// Secondary digest bound to `root`
    pub proof: String,
    /// Non-negative quality scalar computed from the tensors
    pub loss: f32,
}

impl Proof {
    pub fn new(root: String, proof: String, loss: f32) -> Self {
        Self { root, proof, loss }
    }
}

impl Display for Proof {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Proof[root: {}, proof: {}, loss: {}]",
            self.root, self.proof, self.loss
        )
    }
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("External prover returned a malformed {field}: {reason}")]
    MalformedExternalProof { field: &'static str, reason: String },
}

/// Generation and verification of proofs over tensors
pub trait ProofSystem: Send + Sync {
    /// Short name of the backend, used in logs
    fn name(&self) -> &'static str;

    /// Produce a proof for the tensors
    fn generate_proof(&self, tensors: &[Tensor]) -> Result<Proof, ProofError>;

    /// Check a proof against the tensors it claims to cover
    fn verify_proof(&self, tensors: &[Tensor], proof: &Proof) -> bool;
}
