//! INT8 tensors produced by a training or inference step and the loss metric
//! attached to every proof.

use std::{fs, io, path::Path};

use crate::config::{
    LOSS_ATTACK_INDEX, LOSS_BLOCK_INDEX, LOSS_EPSILON, LOSS_MIN_TENSOR_LEN, LOSS_MOVE_LOGITS,
};

/// A flat INT8 tensor
pub type Tensor = Vec<i8>;

/// Concatenate all tensors in order into one contiguous buffer
pub fn flatten(tensors: &[Tensor]) -> Vec<i8> {
    let total = tensors.iter().map(Vec::len).sum();
    let mut buffer = Vec::with_capacity(total);
    for tensor in tensors {
        buffer.extend_from_slice(tensor);
    }
    buffer
}

/// View an INT8 tensor as raw bytes
#[inline]
pub fn as_bytes(tensor: &[i8]) -> &[u8] {
    // SAFETY: i8 and u8 have the same size and alignment
    unsafe { std::slice::from_raw_parts(tensor.as_ptr() as *const u8, tensor.len()) }
}

/// Load a raw binary file as a single INT8 tensor
pub fn load_tensor_file<P: AsRef<Path>>(path: P) -> io::Result<Tensor> {
    let bytes = fs::read(path)?;
    Ok(bytes.into_iter().map(|b| b as i8).collect())
}

/// Deterministic loss of a prediction against a target.
///
/// The first tensor is the prediction and the second the target:
/// - indices 0..4: softmax cross-entropy over the move logits
/// - index 4: squared error of the attack power
/// - index 5: binary cross-entropy (through a sigmoid) of the block flag
///
/// Returns 0 when fewer than two tensors are given or either of them is
/// shorter than six elements.
pub fn compute_loss(tensors: &[Tensor]) -> f32 {
    if tensors.len() < 2 {
        return 0.0;
    }

    let pred = &tensors[0];
    let target = &tensors[1];
    if pred.len() < LOSS_MIN_TENSOR_LEN || target.len() < LOSS_MIN_TENSOR_LEN {
        return 0.0;
    }

    move_cross_entropy(&pred[..LOSS_MOVE_LOGITS], &target[..LOSS_MOVE_LOGITS])
        + attack_squared_error(pred[LOSS_ATTACK_INDEX], target[LOSS_ATTACK_INDEX])
        + block_cross_entropy(pred[LOSS_BLOCK_INDEX], target[LOSS_BLOCK_INDEX])
}

fn move_cross_entropy(logits: &[i8], target: &[i8]) -> f32 {
    // Shift by the max logit for a stable softmax
    let max_logit = logits.iter().copied().max().unwrap_or(0) as f32;
    let exps: Vec<f32> = logits
        .iter()
        .map(|&logit| (logit as f32 - max_logit).exp())
        .collect();
    let sum: f32 = exps.iter().sum();

    exps.iter()
        .zip(target)
        .map(|(exp, &t)| {
            let p = (exp / sum).max(LOSS_EPSILON);
            -(t as f32) * p.ln()
        })
        .sum()
}

fn attack_squared_error(pred: i8, target: i8) -> f32 {
    let diff = pred as f32 - target as f32;
    diff * diff
}

fn block_cross_entropy(logit: i8, target: i8) -> f32 {
    let t = target as f32;
    let prob = 1.0 / (1.0 + (-(logit as f32)).exp());
    let prob = prob.clamp(LOSS_EPSILON, 1.0 - LOSS_EPSILON);
    -(t * prob.ln() + (1.0 - t) * (1.0 - prob).ln())
}
