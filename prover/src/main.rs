use std::{path::PathBuf, process};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use pouw_common::{
    config::{DEFAULT_QUORUM, VERSION},
    logger::{setup_logger, LogConfig},
    validator::CheckpointValidator,
};
use pouw_daemon::{
    config::{parse_peer_address, GossipConfig},
    p2p::GossipNode,
};
use pouw_prover::{load_tensors, Backend, ProofReport};

// Exit code when the replayed root differs from the expected one
const EXIT_ROOT_MISMATCH: i32 = 2;

/// Prover CLI configuration
#[derive(Parser, Clone, Debug)]
#[command(name = "pouw-prover", version = VERSION)]
#[command(about = "Generate a proof of useful work from INT8 tensor files")]
#[command(styles = pouw_common::get_cli_styles())]
pub struct CliConfig {
    /// Tensor files, each read as one raw INT8 tensor
    #[clap(required = true)]
    tensors: Vec<PathBuf>,

    /// Proof backend
    #[clap(long, value_enum, default_value_t = Backend::Hash)]
    backend: Backend,

    /// Replay the tensors and compare the root with this one
    #[clap(long, value_name = "ROOT")]
    expected_root: Option<String>,

    /// Gossip node to send the proof to
    #[clap(long, value_name = "HOST:PORT")]
    gossip: Option<String>,

    /// Print the proof as JSON
    #[clap(long)]
    json: bool,

    #[clap(flatten)]
    log: LogConfig,
}

fn main() -> Result<()> {
    let config = CliConfig::parse();
    setup_logger(&config.log).context("Error while initializing the logger")?;

    let tensors = load_tensors(&config.tensors)?;
    let system = config.backend.proof_system();
    info!("Generating proof with the {} backend", system.name());

    let validator = CheckpointValidator::new(system.clone(), DEFAULT_QUORUM);
    let proof = validator
        .generate_stark_proof(&tensors)
        .context("Error while generating the proof")?;

    let report = ProofReport {
        backend: system.name(),
        files: config.tensors.clone(),
        proof,
    };
    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if let Some(expected) = config.expected_root.as_deref() {
        if !validator.replay_and_verify(&tensors, expected) {
            eprintln!("Root mismatch: expected {}, got {}", expected, report.proof.root);
            process::exit(EXIT_ROOT_MISMATCH);
        }
        info!("Replay matches the expected root");
    }

    if let Some(target) = config.gossip.as_deref() {
        let (host, port) = parse_peer_address(target)?;
        let node = GossipNode::new(GossipConfig::local());
        if node.connect(&host, port) {
            node.submit(&report.proof);
            println!("Proof sent to {}", target);
        } else {
            warn!("Could not reach gossip node {}", target);
        }
        node.stop();
    }

    Ok(())
}
