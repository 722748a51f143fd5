use std::io::Error as IoError;
use thiserror::Error;

use super::packet::PacketError;

/// Error type for gossip node operations.
#[derive(Error, Debug)]
pub enum P2pError {
    /// I/O error on a socket.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Socket bind error.
    #[error("Failed to bind TCP listener on {0}: {1}")]
    BindFailed(String, IoError),

    /// `listen` was called twice.
    #[error("Node is already listening on port {0}")]
    AlreadyListening(u16),

    /// The node was stopped and cannot be restarted.
    #[error("Node is stopped")]
    Stopped,

    /// A worker thread could not be started.
    #[error("Failed to spawn {0} thread: {1}")]
    ThreadSpawn(&'static str, IoError),

    /// Frame encoding or decoding error.
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// Result type alias for gossip operations.
pub type P2pResult<T> = Result<T, P2pError>;
