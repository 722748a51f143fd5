use log::trace;
use std::{
    fmt::{self, Display, Formatter},
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The remote peer connected to us
    In,
    /// We dialed the remote peer
    Out,
}

/// Write half of a connection. The read half lives in the peer's receive thread.
pub struct Peer {
    id: u64,
    addr: SocketAddr,
    direction: Direction,
    stream: TcpStream,
}

impl Peer {
    pub fn new(id: u64, addr: SocketAddr, direction: Direction, stream: TcpStream) -> Self {
        Self {
            id,
            addr,
            direction,
            stream,
        }
    }

    pub fn get_id(&self) -> u64 {
        self.id
    }

    /// Write a whole frame, blocking until it is handed to the kernel
    pub fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()
    }

    /// Close both halves, which also unblocks the receive thread
    pub fn close(&self) {
        trace!("closing {}", self);
        // Already closed sockets are fine
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Peer[id: {}, addr: {}, direction: {:?}]",
            self.id, self.addr, self.direction
        )
    }
}
