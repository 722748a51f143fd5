pub const VERSION: &str = env!("BUILD_VERSION");

// ===== REWARDS =====

// Core tokens credited to a miner per unit of energy spent on a finalized checkpoint
// core_balance += energy_spent * CORE_PER_ENERGY
pub const CORE_PER_ENERGY: u64 = 1;

// ===== ATTESTATION =====

// Attestations needed before a checkpoint may finalize without an external proof
pub const DEFAULT_QUORUM: usize = 3;

// ===== LOSS METRIC =====

// Number of move logits at the start of a prediction/target tensor
pub const LOSS_MOVE_LOGITS: usize = 4;
// Index of the attack power regression value
pub const LOSS_ATTACK_INDEX: usize = 4;
// Index of the block flag logit
pub const LOSS_BLOCK_INDEX: usize = 5;
// Minimum tensor length for a non-zero loss
pub const LOSS_MIN_TENSOR_LEN: usize = 6;
// Probabilities are floored/clamped with this value before taking a log
pub const LOSS_EPSILON: f32 = 1e-7;

// ===== EXTERNAL PROVER =====

// Environment variable overriding the prover library path
pub const PROVER_PATH_ENV: &str = "ZK_PROVER_PATH";

// Exported entry points of the prover library
pub const PROVER_GENERATE_SYMBOL: &[u8] = b"zk_generate_proof\0";
pub const PROVER_VERIFY_SYMBOL: &[u8] = b"zk_verify_proof\0";

// Capacity of each digest buffer crossing the C boundary
// A digest must fit entirely, it is never truncated
pub const RAW_DIGEST_CAPACITY: usize = 128;

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        pub const DEFAULT_PROVER_LIBRARY: &str = "stark_prover_v2.dll";
        pub const LEGACY_PROVER_LIBRARY: &str = "stark_prover.dll";
    } else if #[cfg(target_os = "macos")] {
        pub const DEFAULT_PROVER_LIBRARY: &str = "libstark_prover_v2.dylib";
        pub const LEGACY_PROVER_LIBRARY: &str = "libstark_prover.dylib";
    } else {
        pub const DEFAULT_PROVER_LIBRARY: &str = "libstark_prover_v2.so";
        pub const LEGACY_PROVER_LIBRARY: &str = "libstark_prover.so";
    }
}
