//! A server connection and the write bookkeeping the transport keeps beside it.

use rustls::ServerConnection;

/// One slot's TLS state.
pub struct TlsSession {
    conn: ServerConnection,
    /// Plaintext length of a write whose records are still queued.
    unflushed: usize,
}

impl TlsSession {
    pub fn new(conn: ServerConnection) -> Self {
        Self { conn, unflushed: 0 }
    }

    pub fn connection_mut(&mut self) -> &mut ServerConnection {
        &mut self.conn
    }

    /// Bytes accepted by a write that has not yet been reported to the caller
    /// because its records could not all reach the socket.
    pub fn unflushed(&self) -> usize {
        self.unflushed
    }

    pub(crate) fn set_unflushed(&mut self, accepted: usize) {
        self.unflushed = accepted;
    }

    pub(crate) fn take_unflushed(&mut self) -> usize {
        std::mem::take(&mut self.unflushed)
    }
}
