//! TCP gossip of proofs between nodes.
//!
//! Every node keeps the proofs it has seen in a [`ProofStore`] and floods new
//! ones to all connected peers. One thread accepts inbound connections and
//! each connection, inbound or outbound, gets its own blocking receive thread.
//! Worker threads only hold a weak reference to the node, so dropping the last
//! handle stops it.

pub mod error;
pub mod packet;
pub mod peer;
pub mod stats;

use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use pouw_common::{
    proof::{Proof, ProofStore},
    validator::{ProofBroadcaster, ProofCallback},
};
use std::{
    io::BufReader,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    thread::{self, JoinHandle},
};

use crate::config::{GossipConfig, ACCEPT_ERROR_BACKOFF, WAKE_TIMEOUT};

pub use error::{P2pError, P2pResult};
pub use peer::{Direction, Peer};
pub use stats::{NetStats, NetStatsSnapshot};

use packet::{encode_proof, read_proof};

pub struct GossipNode {
    config: GossipConfig,
    // Every proof seen, also used as the seen set for re-broadcast
    store: ProofStore,
    // Write halves of all live connections
    peers: Mutex<Vec<Peer>>,
    on_proof: RwLock<Option<ProofCallback>>,
    stats: NetStats,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    receivers: Mutex<Vec<JoinHandle<()>>>,
    next_peer_id: AtomicU64,
}

impl GossipNode {
    pub fn new(config: GossipConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            store: ProofStore::new(),
            peers: Mutex::new(Vec::new()),
            on_proof: RwLock::new(None),
            stats: NetStats::default(),
            running: AtomicBool::new(true),
            local_addr: Mutex::new(None),
            accept_thread: Mutex::new(None),
            receivers: Mutex::new(Vec::new()),
            next_peer_id: AtomicU64::new(0),
        })
    }

    /// Bind the listener and start accepting peers.
    /// Port 0 picks a free port, the actual port is returned.
    pub fn listen(self: &Arc<Self>, port: u16) -> P2pResult<u16> {
        let mut local_addr = self.local_addr.lock();
        if let Some(addr) = *local_addr {
            return Err(P2pError::AlreadyListening(addr.port()));
        }

        if !self.is_running() {
            return Err(P2pError::Stopped);
        }

        let bind_address = format!("{}:{}", self.config.bind_host, port);
        let listener = TcpListener::bind(&bind_address)
            .map_err(|e| P2pError::BindFailed(bind_address.clone(), e))?;
        let addr = listener.local_addr()?;

        let node = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name("pouw-p2p-accept".to_string())
            .spawn(move || accept_loop(node, listener))
            .map_err(|e| P2pError::ThreadSpawn("accept", e))?;

        *self.accept_thread.lock() = Some(handle);
        *local_addr = Some(addr);

        if log::log_enabled!(log::Level::Info) {
            info!("Gossip node listening on {}", addr);
        }
        Ok(addr.port())
    }

    /// Dial a peer, then send it every proof known so far.
    /// Returns false if the connection or the initial sync failed.
    pub fn connect(self: &Arc<Self>, host: &str, port: u16) -> bool {
        if !self.is_running() {
            return false;
        }

        let stream = match TcpStream::connect((host, port)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to connect to {}:{}: {}", host, port, e);
                return false;
            }
        };

        match self.add_peer(stream, Direction::Out) {
            Ok(id) => {
                if log::log_enabled!(log::Level::Info) {
                    info!("Connected to {}:{} (peer {})", host, port, id);
                }
                true
            }
            Err(e) => {
                warn!("Error while adding peer {}:{}: {}", host, port, e);
                false
            }
        }
    }

    /// Store a local proof, flood it and fire the callback
    pub fn submit(&self, proof: &Proof) {
        self.store.insert(proof.clone());
        self.broadcast(proof, None);
        self.notify(proof);
    }

    pub fn set_on_proof(&self, callback: ProofCallback) {
        *self.on_proof.write() = Some(callback);
    }

    /// Stop accepting, close every connection and join the worker threads.
    /// Calling it again does nothing.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let local_addr = *self.local_addr.lock();
        if let Some(addr) = local_addr {
            // The accept thread only notices the flag once accept returns
            if let Err(e) = TcpStream::connect_timeout(&wake_address(addr), WAKE_TIMEOUT) {
                debug!("Could not wake the accept thread: {}", e);
            }
        }

        let current = thread::current().id();
        let accept_thread = self.accept_thread.lock().take();
        if let Some(handle) = accept_thread {
            if handle.thread().id() != current && handle.join().is_err() {
                error!("Accept thread panicked");
            }
        }

        let peers: Vec<Peer> = self.peers.lock().drain(..).collect();
        for peer in &peers {
            peer.close();
        }

        let receivers: Vec<JoinHandle<()>> = self.receivers.lock().drain(..).collect();
        for handle in receivers {
            if handle.thread().id() != current && handle.join().is_err() {
                error!("Receive thread panicked");
            }
        }

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Gossip node stopped ({} peers closed, {})",
                peers.len(),
                self.stats.snapshot()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Listening port, 0 if the node is not listening
    pub fn port(&self) -> u16 {
        self.local_addr.lock().map(|addr| addr.port()).unwrap_or(0)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Snapshot of every known proof
    pub fn proofs(&self) -> Vec<Proof> {
        self.store.all()
    }

    pub fn store(&self) -> &ProofStore {
        &self.store
    }

    pub fn stats(&self) -> NetStatsSnapshot {
        self.stats.snapshot()
    }

    fn add_peer(self: &Arc<Self>, stream: TcpStream, direction: Direction) -> P2pResult<u64> {
        stream.set_nodelay(true)?;
        // A blocked write would otherwise hold the peers lock forever
        stream.set_write_timeout(Some(self.config.write_timeout))?;
        let addr = stream.peer_addr()?;
        let reader = stream.try_clone()?;
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        let mut peer = Peer::new(id, addr, direction, stream);

        {
            let mut peers = self.peers.lock();
            if !self.is_running() {
                peer.close();
                return Err(P2pError::Stopped);
            }

            // Sync under the lock so no broadcast interleaves with the snapshot
            if direction == Direction::Out {
                if let Err(e) = self.sync_peer(&mut peer) {
                    peer.close();
                    return Err(e);
                }
            }
            peers.push(peer);
        }

        let node = Arc::downgrade(self);
        let max_field_size = self.config.max_field_size;
        let spawned = thread::Builder::new()
            .name(format!("pouw-p2p-peer-{}", id))
            .spawn(move || receive_loop(node, id, reader, max_field_size));

        match spawned {
            Ok(handle) => {
                let mut receivers = self.receivers.lock();
                receivers.retain(|handle| !handle.is_finished());
                receivers.push(handle);
                Ok(id)
            }
            Err(e) => {
                self.remove_peer(id);
                Err(P2pError::ThreadSpawn("receive", e))
            }
        }
    }

    fn sync_peer(&self, peer: &mut Peer) -> P2pResult<()> {
        let proofs = self.store.all();
        debug!("Sending {} proofs to new {}", proofs.len(), peer);
        for proof in proofs {
            let frame = match encode_proof(&proof, self.config.max_field_size) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Skipping proof {} in sync: {}", proof.root, e);
                    continue;
                }
            };
            peer.send(&frame)?;
            self.stats.record_sent(frame.len());
        }
        Ok(())
    }

    fn remove_peer(&self, id: u64) {
        let mut peers = self.peers.lock();
        if let Some(position) = peers.iter().position(|peer| peer.get_id() == id) {
            let peer = peers.remove(position);
            peer.close();
            debug!("Removed {}", peer);
        }
    }

    // Send to every peer except `exclude`, dropping peers that fail
    fn broadcast(&self, proof: &Proof, exclude: Option<u64>) {
        let frame = match encode_proof(proof, self.config.max_field_size) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Not broadcasting proof {}: {}", proof.root, e);
                return;
            }
        };

        let mut peers = self.peers.lock();
        peers.retain_mut(|peer| {
            if Some(peer.get_id()) == exclude {
                return true;
            }

            match peer.send(&frame) {
                Ok(()) => {
                    self.stats.record_sent(frame.len());
                    true
                }
                Err(e) => {
                    warn!("Dropping {} after send failure: {}", peer, e);
                    peer.close();
                    false
                }
            }
        });
    }

    fn handle_received(&self, from: u64, proof: Proof, size: usize) {
        self.stats.record_received(size);
        if log::log_enabled!(log::Level::Trace) {
            trace!("Received {} from peer {}", proof, from);
        }

        // Only unseen roots are flooded further, which bounds propagation
        if self.store.insert(proof.clone()) {
            self.broadcast(&proof, Some(from));
        }
        self.notify(&proof);
    }

    fn notify(&self, proof: &Proof) {
        let callback = self.on_proof.read().clone();
        if let Some(callback) = callback {
            callback(proof);
        }
    }
}

impl ProofBroadcaster for GossipNode {
    fn submit(&self, proof: &Proof) {
        GossipNode::submit(self, proof)
    }

    fn set_on_proof(&self, callback: ProofCallback) {
        GossipNode::set_on_proof(self, callback)
    }
}

impl Drop for GossipNode {
    fn drop(&mut self) {
        self.stop();
    }
}

// Address to reach our own listener
fn wake_address(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

fn accept_loop(node: Weak<GossipNode>, listener: TcpListener) {
    for incoming in listener.incoming() {
        let Some(node) = node.upgrade() else {
            break;
        };

        if !node.is_running() {
            break;
        }

        match incoming {
            Ok(stream) => {
                if let Err(e) = node.add_peer(stream, Direction::In) {
                    warn!("Error while accepting peer: {}", e);
                }
            }
            Err(e) => {
                debug!("Error while accepting connection: {}", e);
                drop(node);
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }
    debug!("Accept loop exited");
}

fn receive_loop(node: Weak<GossipNode>, id: u64, stream: TcpStream, max_field_size: usize) {
    let mut reader = BufReader::new(stream);
    loop {
        let result = read_proof(&mut reader, max_field_size);
        let Some(node) = node.upgrade() else {
            break;
        };

        match result {
            Ok((proof, size)) => {
                if !node.is_running() {
                    break;
                }
                node.handle_received(id, proof, size);
            }
            Err(e) => {
                debug!("Peer {} disconnected: {}", id, e);
                node.remove_peer(id);
                break;
            }
        }
    }
}
