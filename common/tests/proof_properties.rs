//! Property-based tests for the proof systems and the finalization ledger.
//!
//! Properties tested:
//! - Any tensor set verifies against its own proof
//! - Tampering with the root, the proof or the loss is detected
//! - Per creature, finalized epochs are 0, 1, 2, ... and losses never increase
//! - Balances equal the sum of finalized energy

#![allow(clippy::disallowed_methods)]

use pouw_common::{
    config::CORE_PER_ENERGY,
    ledger::FinalizationLedger,
    proof::{HashProofSystem, ProofSystem},
    tensor::{compute_loss, Tensor},
};
use proptest::prelude::*;

fn tensors_strategy() -> impl Strategy<Value = Vec<Tensor>> {
    prop::collection::vec(prop::collection::vec(any::<i8>(), 0..32), 0..5)
}

proptest! {
    #[test]
    fn test_generated_proofs_verify(tensors in tensors_strategy()) {
        let system = HashProofSystem::new();
        let proof = system.generate_proof(&tensors).unwrap();
        prop_assert!(system.verify_proof(&tensors, &proof));
        prop_assert!(proof.loss >= 0.0);
        prop_assert_eq!(proof.loss.to_bits(), compute_loss(&tensors).to_bits());
    }
}

proptest! {
    #[test]
    fn test_tampered_proofs_rejected(
        tensors in tensors_strategy(),
        position in 0usize..64,
        field in 0u8..3,
    ) {
        let system = HashProofSystem::new();
        let mut proof = system.generate_proof(&tensors).unwrap();

        match field {
            0 | 1 => {
                let target = if field == 0 { &mut proof.root } else { &mut proof.proof };
                let mut bytes = target.clone().into_bytes();
                // Swap the hex digit for another valid one
                bytes[position] = if bytes[position] == b'0' { b'1' } else { b'0' };
                *target = String::from_utf8(bytes).unwrap();
            }
            _ => proof.loss += 0.25,
        }

        prop_assert!(!system.verify_proof(&tensors, &proof));
    }
}

proptest! {
    #[test]
    fn test_ledger_invariants_hold(
        ops in prop::collection::vec((0u32..3, 0u32..4, 0u16..400, 0u32..100, any::<bool>()), 1..60),
    ) {
        let ledger = FinalizationLedger::new(1);

        for (i, (creature, epoch, loss_centi, energy, proven)) in ops.into_iter().enumerate() {
            let root = format!("root-{i}");
            let loss = loss_centi as f32 / 100.0;
            ledger.submit_checkpoint(creature, epoch, &root, "miner", loss, energy);
            if proven {
                ledger.submit_proof(&root);
            } else {
                ledger.attest(&root);
            }
            ledger.finalize_checkpoint(&root);
        }

        let chain = ledger.chain();
        let mut expected_epoch = [0u32; 3];
        let mut last_loss: [Option<f32>; 3] = [None; 3];
        let mut energy = 0u64;

        for (position, block) in chain.iter().enumerate() {
            prop_assert_eq!(block.index as usize, position + 1);

            let creature = block.creature_id as usize;
            prop_assert_eq!(block.epoch_id, expected_epoch[creature]);
            expected_epoch[creature] += 1;

            if let Some(previous) = last_loss[creature] {
                prop_assert!(block.loss <= previous);
            }
            last_loss[creature] = Some(block.loss);
            energy += block.energy_spent as u64;
        }

        prop_assert_eq!(ledger.energy_balance("miner"), energy);
        prop_assert_eq!(ledger.core_balance("miner"), energy * CORE_PER_ENERGY);
    }
}
