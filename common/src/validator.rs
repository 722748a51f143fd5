//! Caller-facing facade over a proof system, an attestation tracker and an
//! optional gossip broadcaster.

use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::{
    attestation::AttestationTracker,
    config::DEFAULT_QUORUM,
    onchain::OnChainSubmitter,
    proof::{Proof, ProofError, ProofSystem},
    tensor::{compute_loss, Tensor},
};

/// Callback invoked for every proof received from the network
pub type ProofCallback = Arc<dyn Fn(&Proof) + Send + Sync>;

/// Something able to propagate proofs to other nodes
pub trait ProofBroadcaster: Send + Sync {
    /// Store and propagate a locally produced proof
    fn submit(&self, proof: &Proof);

    /// Replace the callback fired on received proofs
    fn set_on_proof(&self, callback: ProofCallback);
}

pub struct CheckpointValidator {
    proof_system: Arc<dyn ProofSystem>,
    tracker: Arc<AttestationTracker>,
    gossip: Option<Arc<dyn ProofBroadcaster>>,
    // Loss of the last accepted proof, starts at +inf
    last_loss: Mutex<f32>,
}

impl CheckpointValidator {
    pub fn new(proof_system: Arc<dyn ProofSystem>, quorum: usize) -> Self {
        Self {
            proof_system,
            tracker: Arc::new(AttestationTracker::new(quorum)),
            gossip: None,
            last_loss: Mutex::new(f32::INFINITY),
        }
    }

    pub fn with_default_quorum(proof_system: Arc<dyn ProofSystem>) -> Self {
        Self::new(proof_system, DEFAULT_QUORUM)
    }

    /// Attach a broadcaster. Every proof it receives is attested in this
    /// validator's tracker.
    pub fn with_gossip(mut self, gossip: Arc<dyn ProofBroadcaster>) -> Self {
        let tracker = self.tracker.clone();
        gossip.set_on_proof(Arc::new(move |proof: &Proof| {
            let count = tracker.attest(&proof.root);
            trace!("attested {} from gossip ({} total)", proof.root, count);
        }));
        self.gossip = Some(gossip);
        self
    }

    /// Root of the proof for these tensors
    pub fn generate_proof_root(&self, tensors: &[Tensor]) -> Result<String, ProofError> {
        self.proof_system
            .generate_proof(tensors)
            .map(|proof| proof.root)
    }

    /// Generate a proof and broadcast it if a broadcaster is attached
    pub fn generate_stark_proof(&self, tensors: &[Tensor]) -> Result<Proof, ProofError> {
        let proof = self.proof_system.generate_proof(tensors)?;
        if let Some(gossip) = &self.gossip {
            gossip.submit(&proof);
        }
        Ok(proof)
    }

    /// Verify a proof, then apply the loss ratchet: the loss recomputed from
    /// the tensors may not exceed the last accepted one.
    pub fn verify_stark_proof(&self, tensors: &[Tensor], proof: &Proof) -> bool {
        if !self.proof_system.verify_proof(tensors, proof) {
            debug!("{} rejected proof {}", self.proof_system.name(), proof.root);
            return false;
        }

        self.accept_loss(compute_loss(tensors))
    }

    /// Generate, verify, ratchet and submit on chain. The proof is gossiped
    /// only once the chain accepted it.
    pub fn prove_and_submit<S: OnChainSubmitter + ?Sized>(
        &self,
        tensors: &[Tensor],
        onchain: &S,
    ) -> bool {
        let proof = match self.proof_system.generate_proof(tensors) {
            Ok(proof) => proof,
            Err(e) => {
                warn!("Error while generating proof: {}", e);
                return false;
            }
        };

        if !self.proof_system.verify_proof(tensors, &proof) {
            return false;
        }

        if !self.accept_loss(proof.loss) {
            return false;
        }

        if !onchain.submit_proof(&proof) {
            debug!("On-chain submission refused proof {}", proof.root);
            return false;
        }

        if let Some(gossip) = &self.gossip {
            gossip.submit(&proof);
        }
        true
    }

    /// Regenerate the proof and compare only its root
    pub fn replay_and_verify(&self, tensors: &[Tensor], expected_root: &str) -> bool {
        match self.proof_system.generate_proof(tensors) {
            Ok(proof) => proof.root == expected_root,
            Err(e) => {
                warn!("Error while replaying proof: {}", e);
                false
            }
        }
    }

    pub fn attest(&self, root: &str) -> usize {
        self.tracker.attest(root)
    }

    pub fn has_quorum(&self, root: &str) -> bool {
        self.tracker.has_quorum(root)
    }

    pub fn tracker(&self) -> &Arc<AttestationTracker> {
        &self.tracker
    }

    pub fn last_accepted_loss(&self) -> f32 {
        *self.last_loss.lock()
    }

    fn accept_loss(&self, loss: f32) -> bool {
        let mut last = self.last_loss.lock();
        if loss.is_nan() || loss > *last {
            debug!("loss {} regresses over last accepted {}", loss, *last);
            return false;
        }
        *last = loss;
        true
    }
}
