//! Helpers behind the `pouw_prover` binary: tensor loading, backend
//! selection and report formatting.

use log::debug;
use pouw_common::{
    proof::{HashProofSystem, PluginProofSystem, Proof, ProofSystem},
    tensor::{load_tensor_file, Tensor},
};
use serde::Serialize;
use std::{
    fmt::{self, Display, Formatter},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("Failed to read tensor file '{path}': {source}")]
    TensorFile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("No tensor file given")]
    NoTensors,
}

/// Proof backend selectable from the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// In-process BLAKE3 proofs
    Hash,
    /// External prover library, aborts if it cannot be loaded
    Plugin,
}

impl Backend {
    pub fn proof_system(self) -> Arc<dyn ProofSystem> {
        match self {
            Backend::Hash => Arc::new(HashProofSystem::new()),
            Backend::Plugin => Arc::new(PluginProofSystem::load_or_abort()),
        }
    }
}

/// Read every file as one INT8 tensor, keeping the order given
pub fn load_tensors<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Tensor>, ProverError> {
    if paths.is_empty() {
        return Err(ProverError::NoTensors);
    }

    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let tensor = load_tensor_file(path).map_err(|source| ProverError::TensorFile {
                path: path.display().to_string(),
                source,
            })?;
            debug!("Loaded {} bytes from {}", tensor.len(), path.display());
            Ok(tensor)
        })
        .collect()
}

/// Result printed by the binary
#[derive(Debug, Serialize)]
pub struct ProofReport {
    pub backend: &'static str,
    pub files: Vec<PathBuf>,
    #[serde(flatten)]
    pub proof: Proof,
}

impl Display for ProofReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Root:  {}", self.proof.root)?;
        writeln!(f, "Proof: {}", self.proof.proof)?;
        write!(f, "Loss:  {}", self.proof.loss)
    }
}
