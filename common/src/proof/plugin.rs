//! Proof system backed by an external STARK/SNARK prover.
//!
//! The prover is reached through [`ExternalProver`] so it can be injected.
//! [`DynamicProver`] is the production implementation: it loads a shared
//! library exporting two C entry points
//!
//! ```text
//! void zk_generate_proof(const int8_t* data, size_t len, ProofRaw* out);
//! bool zk_verify_proof(const int8_t* data, size_t len, const ProofRaw* proof);
//! ```
//!
//! where `ProofRaw` holds two length-prefixed digest buffers (see [`RawDigest`]).
//! The loss attached to a proof is always computed locally.

use libloading::{Library, Symbol};
use log::{debug, error, info};
use std::{env, path::Path, sync::Arc};
use thiserror::Error;

use crate::{
    config::{
        DEFAULT_PROVER_LIBRARY, LEGACY_PROVER_LIBRARY, PROVER_GENERATE_SYMBOL, PROVER_PATH_ENV,
        PROVER_VERIFY_SYMBOL, RAW_DIGEST_CAPACITY,
    },
    tensor::{compute_loss, flatten, Tensor},
};

use super::{Proof, ProofError, ProofSystem};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to load STARK prover (tried {tried:?}). Set {env} or install the prover library: {source}", env = PROVER_PATH_ENV)]
    Load {
        tried: Vec<String>,
        #[source]
        source: libloading::Error,
    },

    #[error("STARK prover '{path}' does not export '{symbol}': {source}")]
    MissingSymbol {
        path: String,
        symbol: String,
        #[source]
        source: libloading::Error,
    },
}

/// A digest crossing the C boundary: explicit length plus a fixed buffer.
/// Only the first `len` bytes are meaningful, no terminator is used.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawDigest {
    pub len: u32,
    pub bytes: [u8; RAW_DIGEST_CAPACITY],
}

impl RawDigest {
    pub const fn empty() -> Self {
        Self {
            len: 0,
            bytes: [0; RAW_DIGEST_CAPACITY],
        }
    }

    /// Copy a digest into a raw buffer, None if it does not fit
    pub fn encode(value: &str) -> Option<Self> {
        let bytes = value.as_bytes();
        if bytes.len() > RAW_DIGEST_CAPACITY {
            return None;
        }

        let mut raw = Self::empty();
        raw.bytes[..bytes.len()].copy_from_slice(bytes);
        raw.len = bytes.len() as u32;
        Some(raw)
    }

    /// Read the digest back, rejecting out of range lengths and non UTF-8 data
    pub fn decode(&self, field: &'static str) -> Result<String, ProofError> {
        let len = self.len as usize;
        if len > RAW_DIGEST_CAPACITY {
            return Err(ProofError::MalformedExternalProof {
                field,
                reason: format!("length {len} exceeds capacity {RAW_DIGEST_CAPACITY}"),
            });
        }

        String::from_utf8(self.bytes[..len].to_vec()).map_err(|e| {
            ProofError::MalformedExternalProof {
                field,
                reason: e.to_string(),
            }
        })
    }
}

/// Output/input structure of the prover entry points
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ProofRaw {
    pub root: RawDigest,
    pub proof: RawDigest,
}

impl ProofRaw {
    pub const fn empty() -> Self {
        Self {
            root: RawDigest::empty(),
            proof: RawDigest::empty(),
        }
    }
}

/// An external prover working on the flattened tensor buffer
pub trait ExternalProver: Send + Sync {
    /// Produce `(root, proof)` for the buffer
    fn generate(&self, data: &[i8]) -> Result<(String, String), ProofError>;

    /// Check `(root, proof)` against the buffer
    fn verify(&self, data: &[i8], root: &str, proof: &str) -> bool;
}

type GenerateFn = unsafe extern "C" fn(*const i8, usize, *mut ProofRaw);
type VerifyFn = unsafe extern "C" fn(*const i8, usize, *const ProofRaw) -> bool;

/// Prover loaded from a shared library at runtime
pub struct DynamicProver {
    path: String,
    generate: GenerateFn,
    verify: VerifyFn,
    // Keeps the entry points above valid
    _library: Library,
}

impl DynamicProver {
    /// Candidate library paths in the order they are tried.
    ///
    /// With an override only that path is used, otherwise the default name
    /// then the legacy one. A bare file name is tried in the working directory
    /// first, then through the system library search.
    pub fn candidate_paths(env_override: Option<&str>) -> Vec<String> {
        let names = match env_override {
            Some(path) => vec![path.to_string()],
            None => vec![
                DEFAULT_PROVER_LIBRARY.to_string(),
                LEGACY_PROVER_LIBRARY.to_string(),
            ],
        };

        let mut candidates = Vec::with_capacity(names.len() * 2);
        for name in names {
            let is_bare = Path::new(&name).components().count() == 1;
            if is_bare {
                let local = Path::new(".").join(&name).to_string_lossy().into_owned();
                candidates.push(local);
                candidates.push(name);
            } else {
                candidates.push(name);
            }
        }
        candidates
    }

    /// Load the prover using `ZK_PROVER_PATH` or the default library names
    pub fn load_from_env() -> Result<Self, PluginError> {
        let env_override = env::var(PROVER_PATH_ENV).ok();
        Self::load_from(&Self::candidate_paths(env_override.as_deref()))
    }

    /// Load the first library that opens and resolve both entry points
    pub fn load_from(candidates: &[String]) -> Result<Self, PluginError> {
        let mut last_error = None;
        for path in candidates {
            // SAFETY: loading a library runs its initialisers, the prover
            // library is trusted configuration of this node
            match unsafe { Library::new(path) } {
                Ok(library) => return Self::resolve(path.clone(), library),
                Err(e) => {
                    debug!("Could not load prover from {}: {}", path, e);
                    last_error = Some(e);
                }
            }
        }

        Err(PluginError::Load {
            tried: candidates.to_vec(),
            source: last_error.unwrap_or(libloading::Error::DlOpenUnknown),
        })
    }

    fn resolve(path: String, library: Library) -> Result<Self, PluginError> {
        let missing = |symbol: &[u8], source| PluginError::MissingSymbol {
            path: path.clone(),
            symbol: String::from_utf8_lossy(&symbol[..symbol.len() - 1]).into_owned(),
            source,
        };

        // SAFETY: the symbol types match the prover C ABI documented above
        let generate = unsafe {
            let symbol: Symbol<GenerateFn> = library
                .get(PROVER_GENERATE_SYMBOL)
                .map_err(|e| missing(PROVER_GENERATE_SYMBOL, e))?;
            *symbol
        };
        let verify = unsafe {
            let symbol: Symbol<VerifyFn> = library
                .get(PROVER_VERIFY_SYMBOL)
                .map_err(|e| missing(PROVER_VERIFY_SYMBOL, e))?;
            *symbol
        };

        info!("Loaded STARK prover from {}", path);
        Ok(Self {
            path,
            generate,
            verify,
            _library: library,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ExternalProver for DynamicProver {
    fn generate(&self, data: &[i8]) -> Result<(String, String), ProofError> {
        let mut raw = ProofRaw::empty();
        // SAFETY: data is valid for len bytes and raw outlives the call
        unsafe { (self.generate)(data.as_ptr(), data.len(), &mut raw) };
        Ok((raw.root.decode("root")?, raw.proof.decode("proof")?))
    }

    fn verify(&self, data: &[i8], root: &str, proof: &str) -> bool {
        let (Some(root), Some(proof)) = (RawDigest::encode(root), RawDigest::encode(proof)) else {
            return false;
        };

        let raw = ProofRaw { root, proof };
        // SAFETY: data is valid for len bytes and raw outlives the call
        unsafe { (self.verify)(data.as_ptr(), data.len(), &raw) }
    }
}

/// Proof system delegating root/proof to an external prover
pub struct PluginProofSystem {
    prover: Arc<dyn ExternalProver>,
}

impl PluginProofSystem {
    pub fn new(prover: Arc<dyn ExternalProver>) -> Self {
        Self { prover }
    }

    /// Load the shared library prover
    pub fn load() -> Result<Self, PluginError> {
        let prover = DynamicProver::load_from_env()?;
        Ok(Self::new(Arc::new(prover)))
    }

    /// Load the shared library prover or abort the process.
    ///
    /// Without a prover this backend cannot decide anything, so there is no
    /// degraded mode to fall back to.
    pub fn load_or_abort() -> Self {
        match Self::load() {
            Ok(system) => system,
            Err(e) => {
                error!("{}", e);
                eprintln!("{}", e);
                std::process::abort();
            }
        }
    }
}

impl ProofSystem for PluginProofSystem {
    fn name(&self) -> &'static str {
        "plugin"
    }

    fn generate_proof(&self, tensors: &[Tensor]) -> Result<Proof, ProofError> {
        let data = flatten(tensors);
        let (root, proof) = self.prover.generate(&data)?;
        Ok(Proof::new(root, proof, compute_loss(tensors)))
    }

    fn verify_proof(&self, tensors: &[Tensor], proof: &Proof) -> bool {
        let data = flatten(tensors);
        if !self.prover.verify(&data, &proof.root, &proof.proof) {
            return false;
        }

        compute_loss(tensors) == proof.loss
    }
}
