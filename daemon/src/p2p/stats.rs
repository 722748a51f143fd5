use metrics::counter;
use serde::Serialize;
use std::{
    fmt::{self, Display, Formatter},
    sync::atomic::{AtomicU64, Ordering},
};

/// Traffic counters of a gossip node, also exported as metrics
#[derive(Default)]
pub struct NetStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    proofs_sent: AtomicU64,
    proofs_received: AtomicU64,
}

/// Point in time copy of [`NetStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NetStatsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub proofs_sent: u64,
    pub proofs_received: u64,
}

impl NetStats {
    pub fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.proofs_sent.fetch_add(1, Ordering::Relaxed);
        counter!("pouw_p2p_bytes_sent").increment(bytes as u64);
        counter!("pouw_p2p_proofs_sent").increment(1u64);
    }

    pub fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.proofs_received.fetch_add(1, Ordering::Relaxed);
        counter!("pouw_p2p_bytes_received").increment(bytes as u64);
        counter!("pouw_p2p_proofs_received").increment(1u64);
    }

    pub fn snapshot(&self) -> NetStatsSnapshot {
        NetStatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            proofs_sent: self.proofs_sent.load(Ordering::Relaxed),
            proofs_received: self.proofs_received.load(Ordering::Relaxed),
        }
    }
}

impl Display for NetStatsSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} recv={} bytes_sent={} bytes_recv={}",
            self.proofs_sent, self.proofs_received, self.bytes_sent, self.bytes_received
        )
    }
}
