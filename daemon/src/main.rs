use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use pouw_common::{
    config::VERSION,
    ledger::FinalizationLedger,
    logger::{setup_logger, LogConfig},
    proof::Proof,
};
use pouw_daemon::{
    config::{defaults, parse_peer_address, NodeConfig},
    p2p::GossipNode,
};

/// Proof gossip daemon CLI configuration
#[derive(Parser, Clone, Debug)]
#[command(name = "pouw-daemon", version = VERSION)]
#[command(about = "Proof-of-useful-work gossip node")]
#[command(styles = pouw_common::get_cli_styles())]
pub struct CliConfig {
    /// Port to listen on, 0 picks a free one
    #[clap(long, default_value_t = defaults::PORT)]
    port: u16,

    /// Host to bind the listener to
    #[clap(long, default_value_t = String::from(defaults::BIND_HOST))]
    bind_host: String,

    /// Peer to connect to at startup, can be repeated
    #[clap(long = "connect", value_name = "HOST:PORT")]
    peers: Vec<String>,

    /// Log network statistics every N seconds, 0 disables it
    #[clap(long = "stats", value_name = "SECONDS", default_value_t = defaults::STATS_INTERVAL_SECS)]
    stats_interval_secs: u64,

    /// Attestations needed before a checkpoint may finalize
    #[clap(long, default_value_t = defaults::QUORUM)]
    quorum: usize,

    /// Maximum size of a root or proof field accepted from peers
    #[clap(long, default_value_t = defaults::MAX_FIELD_SIZE)]
    max_field_size: usize,

    #[clap(flatten)]
    log: LogConfig,

    /// JSON File to load the configuration from
    #[clap(long)]
    config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    generate_config_template: bool,
}

impl CliConfig {
    fn into_node_config(self) -> NodeConfig {
        NodeConfig {
            bind_host: self.bind_host,
            port: self.port,
            peers: self.peers,
            stats_interval_secs: self.stats_interval_secs,
            quorum: self.quorum,
            max_field_size: self.max_field_size,
            log: self.log,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::parse();

    if let Some(path) = cli_config.config_file.as_ref() {
        if cli_config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {path}");
                eprintln!("Use a different path or remove the existing file");
                return Ok(());
            }

            NodeConfig::generate_template(path)?;
            println!("Configuration template generated at {path}");
            println!("Edit the file and run the daemon with --config-file {path}");
            return Ok(());
        }
    }

    let config = match cli_config.config_file.clone() {
        Some(path) => NodeConfig::from_file(&path)?,
        None => {
            let config = cli_config.into_node_config();
            config.validate()?;
            config
        }
    };

    setup_logger(&config.log).context("Error while initializing the logger")?;
    info!("PoUW daemon v{}", VERSION);

    // Received proofs count as attestations of their root
    let ledger = Arc::new(FinalizationLedger::new(config.quorum));
    let node = GossipNode::new(config.gossip_config());
    {
        let ledger = ledger.clone();
        node.set_on_proof(Arc::new(move |proof: &Proof| {
            let count = ledger.attest(&proof.root);
            if log::log_enabled!(log::Level::Info) {
                info!(
                    "Proof {} (loss {}) attested {}/{}",
                    proof.root,
                    proof.loss,
                    count,
                    ledger.quorum()
                );
            }
        }));
    }

    let port = node
        .listen(config.port)
        .context("Error while starting the gossip listener")?;
    println!("Proof aggregator listening on port {port}");

    for peer in &config.peers {
        let (host, peer_port) = parse_peer_address(peer)?;
        let dialer = node.clone();
        let connected =
            tokio::task::spawn_blocking(move || dialer.connect(&host, peer_port)).await?;
        if !connected {
            warn!("Could not connect to {}", peer);
        }
    }

    let stats_task = (config.stats_interval_secs > 0).then(|| {
        let node = node.clone();
        let period = Duration::from_secs(config.stats_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                info!(
                    "[stats] {} peers={} proofs={}",
                    node.stats(),
                    node.peer_count(),
                    node.store().len()
                );
            }
        })
    });

    tokio::signal::ctrl_c()
        .await
        .context("Error while waiting for Ctrl-C")?;
    info!("Stopping...");

    if let Some(task) = stats_task {
        task.abort();
    }
    tokio::task::spawn_blocking(move || node.stop()).await?;
    Ok(())
}
