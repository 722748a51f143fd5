//! In-memory finalization ledger for proof-of-useful-work checkpoints.
//!
//! Checkpoints are submitted as pending, collect attestations (or an external
//! proof) and are then finalized into an append-only chain of blocks, crediting
//! the miner. Per creature, epochs finalize strictly in order and the loss may
//! never regress.

use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::{
    attestation::AttestationTracker,
    config::{CORE_PER_ENERGY, DEFAULT_QUORUM},
};

/// How a resubmission for a pending root is handled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Last write wins
    #[default]
    Overwrite,
    /// A resubmission with different content is refused
    RejectConflicting,
}

#[derive(Clone, Copy, Debug)]
pub struct LedgerConfig {
    pub quorum: usize,
    pub pending_policy: PendingPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            pending_policy: PendingPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingCheckpoint {
    pub creature_id: u32,
    pub epoch_id: u32,
    pub root_hash: String,
    pub miner: String,
    pub loss: f32,
    pub energy_spent: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain
    pub index: u32,
    pub creature_id: u32,
    pub epoch_id: u32,
    pub root_hash: String,
    pub miner: String,
    pub loss: f32,
    pub energy_spent: u32,
}

/// Reason a finalization attempt was refused
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FinalizeRejection {
    #[error("neither quorum nor external proof for this checkpoint")]
    NotReady,
    #[error("no pending checkpoint for this root")]
    UnknownCheckpoint,
    #[error("checkpoint already finalized")]
    AlreadyFinalized,
    #[error("expected epoch {expected}, got {got}")]
    EpochMismatch { expected: u32, got: u32 },
    #[error("loss {got} regresses over previous {previous}")]
    LossRegression { previous: f32, got: f32 },
}

#[derive(Default)]
struct Balance {
    energy: u64,
    core: u64,
}

#[derive(Default)]
struct LedgerState {
    chain: Vec<Block>,
    pending: HashMap<String, PendingCheckpoint>,
    proven: HashSet<String>,
    finalized: HashSet<String>,
    balances: HashMap<String, Balance>,
    next_epoch: HashMap<u32, u32>,
    last_loss: HashMap<u32, f32>,
}

pub struct FinalizationLedger {
    config: LedgerConfig,
    // Own tracker, independent from any validator
    tracker: AttestationTracker,
    // Every check-then-act sequence runs under this single lock
    state: Mutex<LedgerState>,
}

impl FinalizationLedger {
    pub fn new(quorum: usize) -> Self {
        Self::with_config(LedgerConfig {
            quorum,
            ..Default::default()
        })
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            tracker: AttestationTracker::new(config.quorum),
            config,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Record a pending checkpoint. Returns false if the root is already
    /// finalized or the policy refused a conflicting resubmission.
    pub fn submit_checkpoint(
        &self,
        creature_id: u32,
        epoch_id: u32,
        root_hash: &str,
        miner: &str,
        loss: f32,
        energy_spent: u32,
    ) -> bool {
        let checkpoint = PendingCheckpoint {
            creature_id,
            epoch_id,
            root_hash: root_hash.to_string(),
            miner: miner.to_string(),
            loss,
            energy_spent,
        };

        let mut state = self.state.lock();
        if state.finalized.contains(root_hash) {
            debug!("ignoring checkpoint {} which is already finalized", root_hash);
            return false;
        }

        if self.config.pending_policy == PendingPolicy::RejectConflicting {
            if let Some(existing) = state.pending.get(root_hash) {
                if *existing != checkpoint {
                    debug!("refusing conflicting resubmission of {}", root_hash);
                    return false;
                }
            }
        }

        state.pending.insert(checkpoint.root_hash.clone(), checkpoint);
        true
    }

    /// Mark a root as externally proven, which replaces the quorum requirement
    pub fn submit_proof(&self, root_hash: &str) {
        self.state.lock().proven.insert(root_hash.to_string());
    }

    pub fn attest(&self, root_hash: &str) -> usize {
        self.tracker.attest(root_hash)
    }

    /// Finalize a pending checkpoint, false if any rule refuses it
    pub fn finalize_checkpoint(&self, root_hash: &str) -> bool {
        match self.try_finalize(root_hash) {
            Ok(_) => true,
            Err(e) => {
                debug!("checkpoint {} not finalized: {}", root_hash, e);
                false
            }
        }
    }

    /// Finalize a pending checkpoint and return the appended block
    pub fn try_finalize(&self, root_hash: &str) -> Result<Block, FinalizeRejection> {
        let mut state = self.state.lock();

        if !self.tracker.has_quorum(root_hash) && !state.proven.contains(root_hash) {
            return Err(FinalizeRejection::NotReady);
        }

        if state.finalized.contains(root_hash) {
            return Err(FinalizeRejection::AlreadyFinalized);
        }

        let pending = state
            .pending
            .get(root_hash)
            .ok_or(FinalizeRejection::UnknownCheckpoint)?;

        let expected = state
            .next_epoch
            .get(&pending.creature_id)
            .copied()
            .unwrap_or(0);
        if pending.epoch_id != expected {
            return Err(FinalizeRejection::EpochMismatch {
                expected,
                got: pending.epoch_id,
            });
        }

        // NaN never compares greater, so it is rejected explicitly
        let previous = state.last_loss.get(&pending.creature_id).copied();
        if pending.loss.is_nan() || previous.is_some_and(|previous| pending.loss > previous) {
            return Err(FinalizeRejection::LossRegression {
                previous: previous.unwrap_or(f32::INFINITY),
                got: pending.loss,
            });
        }

        let Some(pending) = state.pending.remove(root_hash) else {
            return Err(FinalizeRejection::UnknownCheckpoint);
        };

        let block = Block {
            index: state.chain.len() as u32 + 1,
            creature_id: pending.creature_id,
            epoch_id: pending.epoch_id,
            root_hash: pending.root_hash,
            miner: pending.miner,
            loss: pending.loss,
            energy_spent: pending.energy_spent,
        };

        let energy = block.energy_spent as u64;
        let balance = state.balances.entry(block.miner.clone()).or_default();
        balance.energy = balance.energy.saturating_add(energy);
        balance.core = balance
            .core
            .saturating_add(energy.saturating_mul(CORE_PER_ENERGY));

        state.finalized.insert(block.root_hash.clone());
        state.proven.remove(&block.root_hash);
        state.next_epoch.insert(block.creature_id, block.epoch_id + 1);
        state.last_loss.insert(block.creature_id, block.loss);
        state.chain.push(block.clone());

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Finalized block #{} for creature {} epoch {} (root {}, miner {}, loss {})",
                block.index, block.creature_id, block.epoch_id, block.root_hash, block.miner, block.loss
            );
        }

        Ok(block)
    }

    /// Snapshot of the finalized blocks in append order
    pub fn chain(&self) -> Vec<Block> {
        self.state.lock().chain.clone()
    }

    pub fn energy_balance(&self, miner: &str) -> u64 {
        self.state
            .lock()
            .balances
            .get(miner)
            .map(|b| b.energy)
            .unwrap_or(0)
    }

    pub fn core_balance(&self, miner: &str) -> u64 {
        self.state
            .lock()
            .balances
            .get(miner)
            .map(|b| b.core)
            .unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_finalized(&self, root_hash: &str) -> bool {
        self.state.lock().finalized.contains(root_hash)
    }

    pub fn next_expected_epoch(&self, creature_id: u32) -> u32 {
        self.state
            .lock()
            .next_epoch
            .get(&creature_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn last_loss(&self, creature_id: u32) -> Option<f32> {
        self.state.lock().last_loss.get(&creature_id).copied()
    }

    pub fn attestations(&self, root_hash: &str) -> usize {
        self.tracker.count(root_hash)
    }

    pub fn quorum(&self) -> usize {
        self.config.quorum
    }
}

impl Default for FinalizationLedger {
    fn default() -> Self {
        Self::with_config(LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attest_times(ledger: &FinalizationLedger, root: &str, times: usize) {
        for _ in 0..times {
            ledger.attest(root);
        }
    }

    #[test]
    fn test_quorum_finalization() {
        let ledger = FinalizationLedger::new(2);
        assert!(ledger.submit_checkpoint(1, 0, "dead", "miner", 1.0, 5));
        attest_times(&ledger, "dead", 2);
        assert!(ledger.finalize_checkpoint("dead"));

        let chain = ledger.chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 1);
        assert_eq!(chain[0].root_hash, "dead");
        assert_eq!(ledger.energy_balance("miner"), 5);
        assert_eq!(ledger.core_balance("miner"), 5 * CORE_PER_ENERGY);
        assert_eq!(ledger.pending_count(), 0);
        assert!(ledger.is_finalized("dead"));
    }

    #[test]
    fn test_skipped_epoch_rejected() {
        let ledger = FinalizationLedger::new(2);
        ledger.submit_checkpoint(1, 0, "dead", "miner", 1.0, 5);
        attest_times(&ledger, "dead", 2);
        assert!(ledger.finalize_checkpoint("dead"));

        ledger.submit_checkpoint(1, 2, "r2", "miner", 0.5, 5);
        attest_times(&ledger, "r2", 2);
        assert!(!ledger.finalize_checkpoint("r2"));
        assert_eq!(
            ledger.try_finalize("r2"),
            Err(FinalizeRejection::EpochMismatch { expected: 1, got: 2 })
        );
        assert_eq!(ledger.chain().len(), 1);
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn test_epochs_in_order() {
        let ledger = FinalizationLedger::new(1);
        ledger.submit_checkpoint(7, 0, "e0", "m", 2.0, 1);
        ledger.submit_checkpoint(7, 1, "e1", "m", 1.5, 1);
        ledger.attest("e0");
        ledger.attest("e1");

        // Out of order first
        assert!(!ledger.finalize_checkpoint("e1"));
        assert!(ledger.finalize_checkpoint("e0"));
        assert!(ledger.finalize_checkpoint("e1"));
        assert_eq!(ledger.next_expected_epoch(7), 2);
        assert_eq!(ledger.next_expected_epoch(8), 0);
    }

    #[test]
    fn test_proof_only_finalization() {
        let ledger = FinalizationLedger::new(3);
        ledger.submit_checkpoint(1, 0, "proven", "miner", 0.0, 3);
        assert_eq!(
            ledger.try_finalize("proven"),
            Err(FinalizeRejection::NotReady)
        );

        ledger.submit_proof("proven");
        assert_eq!(ledger.attestations("proven"), 0);
        assert!(ledger.finalize_checkpoint("proven"));
    }

    #[test]
    fn test_loss_regression_rejected() {
        let ledger = FinalizationLedger::new(1);
        ledger.submit_checkpoint(1, 0, "a", "m", 1.0, 1);
        ledger.submit_proof("a");
        assert!(ledger.finalize_checkpoint("a"));

        ledger.submit_checkpoint(1, 1, "b", "m", 1.5, 1);
        ledger.submit_proof("b");
        assert_eq!(
            ledger.try_finalize("b"),
            Err(FinalizeRejection::LossRegression {
                previous: 1.0,
                got: 1.5
            })
        );

        // Equal loss is fine, other creatures are unconstrained
        ledger.submit_checkpoint(1, 1, "b", "m", 1.0, 1);
        assert!(ledger.finalize_checkpoint("b"));
        ledger.submit_checkpoint(2, 0, "c", "m", 9.0, 1);
        ledger.submit_proof("c");
        assert!(ledger.finalize_checkpoint("c"));
        assert_eq!(ledger.last_loss(1), Some(1.0));
    }

    #[test]
    fn test_nan_loss_rejected() {
        let ledger = FinalizationLedger::new(1);
        ledger.submit_checkpoint(1, 0, "first", "m", f32::NAN, 1);
        ledger.submit_proof("first");
        assert!(matches!(
            ledger.try_finalize("first"),
            Err(FinalizeRejection::LossRegression { got, .. }) if got.is_nan()
        ));

        ledger.submit_checkpoint(1, 0, "first", "m", 1.0, 1);
        assert!(ledger.finalize_checkpoint("first"));

        ledger.submit_checkpoint(1, 1, "nan", "m", f32::NAN, 1);
        ledger.submit_proof("nan");
        assert!(!ledger.finalize_checkpoint("nan"));
        assert_eq!(ledger.last_loss(1), Some(1.0));

        // The bound still holds after the rejected NaN
        ledger.submit_checkpoint(1, 1, "worse", "m", 1000.0, 1);
        ledger.submit_proof("worse");
        assert_eq!(
            ledger.try_finalize("worse"),
            Err(FinalizeRejection::LossRegression {
                previous: 1.0,
                got: 1000.0
            })
        );
        assert_eq!(ledger.chain().len(), 1);
    }

    #[test]
    fn test_reward_accumulation() {
        let ledger = FinalizationLedger::new(1);
        let energies = [5u32, 11, 0, 42];
        for (epoch, energy) in energies.iter().enumerate() {
            let root = format!("root-{epoch}");
            ledger.submit_checkpoint(3, epoch as u32, &root, "alice", 1.0, *energy);
            ledger.attest(&root);
            assert!(ledger.finalize_checkpoint(&root));
        }

        let total: u64 = energies.iter().map(|e| *e as u64).sum();
        assert_eq!(ledger.energy_balance("alice"), total);
        assert_eq!(ledger.core_balance("alice"), total * CORE_PER_ENERGY);
        assert_eq!(ledger.energy_balance("bob"), 0);

        let indexes: Vec<u32> = ledger.chain().iter().map(|b| b.index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_and_already_finalized() {
        let ledger = FinalizationLedger::new(1);
        ledger.attest("ghost");
        assert_eq!(
            ledger.try_finalize("ghost"),
            Err(FinalizeRejection::UnknownCheckpoint)
        );

        ledger.submit_checkpoint(1, 0, "once", "m", 1.0, 1);
        ledger.attest("once");
        assert!(ledger.finalize_checkpoint("once"));
        assert_eq!(
            ledger.try_finalize("once"),
            Err(FinalizeRejection::AlreadyFinalized)
        );

        // Resubmitting a finalized root is ignored
        assert!(!ledger.submit_checkpoint(1, 1, "once", "m", 1.0, 1));
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn test_pending_policies() {
        let overwrite = FinalizationLedger::new(1);
        overwrite.submit_checkpoint(1, 0, "r", "first", 1.0, 1);
        assert!(overwrite.submit_checkpoint(1, 0, "r", "second", 1.0, 1));
        overwrite.attest("r");
        assert_eq!(overwrite.try_finalize("r").unwrap().miner, "second");

        let strict = FinalizationLedger::with_config(LedgerConfig {
            quorum: 1,
            pending_policy: PendingPolicy::RejectConflicting,
        });
        assert!(strict.submit_checkpoint(1, 0, "r", "first", 1.0, 1));
        // Identical resubmission is accepted
        assert!(strict.submit_checkpoint(1, 0, "r", "first", 1.0, 1));
        assert!(!strict.submit_checkpoint(1, 0, "r", "second", 1.0, 1));
        strict.attest("r");
        assert_eq!(strict.try_finalize("r").unwrap().miner, "first");
    }

    #[test]
    fn test_balances_saturate() {
        let ledger = FinalizationLedger::new(1);
        {
            let mut state = ledger.state.lock();
            state.balances.insert(
                "m".to_string(),
                Balance {
                    energy: u64::MAX - 1,
                    core: u64::MAX - 1,
                },
            );
        }
        ledger.submit_checkpoint(1, 0, "r", "m", 1.0, 10);
        ledger.attest("r");
        assert!(ledger.finalize_checkpoint("r"));
        assert_eq!(ledger.energy_balance("m"), u64::MAX);
        assert_eq!(ledger.core_balance("m"), u64::MAX);
    }
}
