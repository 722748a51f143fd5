// Proof gossip node library
// Exposes the p2p layer for the daemon binary, the prover and tests

#![allow(clippy::type_complexity)]
#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod p2p;
