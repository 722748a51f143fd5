use crate::proof::Proof;

/// Boundary to an on-chain contract accepting proofs.
///
/// Implementations encode and submit the call themselves (for example over
/// JSON-RPC), the core only relies on the boolean outcome.
pub trait OnChainSubmitter: Send + Sync {
    /// Submit a proof, true when the chain accepted it
    fn submit_proof(&self, proof: &Proof) -> bool;

    /// Ask the chain whether a root has been recorded
    fn verify(&self, root: &str) -> bool;
}
