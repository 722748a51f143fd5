use parking_lot::Mutex;
use std::collections::HashMap;

/// Counts attestations per proof root against a quorum threshold.
/// Counts never decrease and never expire.
pub struct AttestationTracker {
    quorum: usize,
    counts: Mutex<HashMap<String, usize>>,
}

impl AttestationTracker {
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Record one attestation and return the new count for this root
    pub fn attest(&self, root: &str) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(root.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, root: &str) -> usize {
        self.counts.lock().get(root).copied().unwrap_or(0)
    }

    pub fn has_quorum(&self, root: &str) -> bool {
        self.count(root) >= self.quorum
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }
}
