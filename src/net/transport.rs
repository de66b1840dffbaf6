//! TLS transport hooks.
//!
//! Each hook takes the worker's [`ThreadContext`] and a descriptor, resolves
//! (or lazily binds) the session for it and drives rustls over the raw socket.
//!
//! # Data Flow
//! ```text
//! read:   socket → read_tls → process_new_packets → reader() → caller buffer
//! write:  caller buffer → writer() → write_tls → socket
//! writev: IoSlices → scratch (one copy) → write
//! sendfile: file chunk (pread into scratch) → write, until EOF/count/short write
//! close:  close_notify → best-effort flush → release slot → close(fd)
//! ```
//!
//! # Design Decisions
//! - A would-block in either direction surfaces as `Transfer::WouldBlock`
//! - End of stream, with or without `close_notify`, surfaces as `Transfer::Eof`
//! - `read` reports only bytes copied into the caller's buffer; anything
//!   still decrypted and pending is available through `pending`
//! - Queued TLS records are pushed on every call; records a full socket
//!   could not take stay queued for the next call or `flush`
//! - A write reports its bytes only once their records reached the socket.
//!   Otherwise it answers `WouldBlock` and remembers the accepted length; the
//!   caller retries with the same buffer and the retry flushes first, then
//!   reports the remembered length without writing again

use std::fs::File;
use std::io::{self, IoSlice, Read, Write};
use std::os::fd::RawFd;
use std::os::unix::fs::FileExt;

use rustls::ServerConnection;

use crate::net::error::{Transfer, TransportError};
use crate::net::socket::{close_fd, FdSocket};
use crate::observability::metrics;
use crate::plugin::NetworkLayer;
use crate::session::TlsSession;
use crate::worker::ThreadContext;

/// Maximum TLS plaintext record size; also the `send_file` chunk size.
pub const BUFFER_SIZE: usize = 16 * 1024;

/// The TLS network layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsTransport;

impl TlsTransport {
    /// Decrypted bytes for `fd` that a `read` can return without touching the socket.
    pub fn pending(&self, worker: &mut ThreadContext, fd: RawFd) -> usize {
        worker.buffered(fd)
    }
}

impl NetworkLayer for TlsTransport {
    type Worker = ThreadContext;

    fn read(
        &self,
        worker: &mut ThreadContext,
        fd: RawFd,
        buf: &mut [u8],
    ) -> Result<Transfer, TransportError> {
        let result = worker
            .get_or_create_session(fd)
            .and_then(|conn| read_plaintext(conn, &mut FdSocket::new(fd), buf));
        observe("read", fd, result)
    }

    fn write(
        &self,
        worker: &mut ThreadContext,
        fd: RawFd,
        buf: &[u8],
    ) -> Result<Transfer, TransportError> {
        let result = worker
            .session_with_scratch(fd)
            .and_then(|(session, _)| write_plaintext(session, &mut FdSocket::new(fd), buf));
        observe("write", fd, result)
    }

    fn write_vectored(
        &self,
        worker: &mut ThreadContext,
        fd: RawFd,
        bufs: &[IoSlice<'_>],
    ) -> Result<Transfer, TransportError> {
        let total = bufs.iter().fold(0usize, |acc, b| acc.saturating_add(b.len()));
        let result = worker.session_with_scratch(fd).and_then(|(session, scratch)| {
            scratch.clear();
            scratch.try_reserve_exact(total)?;
            for buf in bufs {
                scratch.extend_from_slice(buf);
            }
            write_plaintext(session, &mut FdSocket::new(fd), scratch)
        });
        observe("writev", fd, result)
    }

    fn send_file(
        &self,
        worker: &mut ThreadContext,
        fd: RawFd,
        file: &File,
        offset: &mut u64,
        count: usize,
    ) -> Result<Transfer, TransportError> {
        let result = worker
            .session_with_scratch(fd)
            .and_then(|(session, scratch)| {
                send_chunks(session, &mut FdSocket::new(fd), scratch, file, offset, count)
            });
        observe("sendfile", fd, result)
    }

    fn close(&self, worker: &mut ThreadContext, fd: RawFd) -> bool {
        let had_session = match worker.tls_session(fd) {
            Some(session) => {
                if session.unflushed() > 0 {
                    tracing::debug!(
                        fd,
                        bytes = session.unflushed(),
                        "[tls] Closing with an unreported write"
                    );
                }
                let conn = session.connection_mut();
                conn.send_close_notify();
                if let Err(e) = flush_records(conn, &mut FdSocket::new(fd)) {
                    tracing::debug!(fd, error = %e, "[tls] close_notify not delivered");
                }
                true
            }
            None => false,
        };
        if had_session {
            worker.release_session(fd);
        }

        if let Err(e) = close_fd(fd) {
            tracing::warn!(fd, error = %e, "[tls] Socket close failed");
        }
        tracing::debug!(fd, had_session, "[tls] Closed");
        had_session
    }

    fn flush(&self, worker: &mut ThreadContext, fd: RawFd) -> Result<Transfer, TransportError> {
        let result = match worker.session(fd) {
            Some(conn) => match flush_records(conn, &mut FdSocket::new(fd)) {
                Ok(true) => Ok(Transfer::Ready(0)),
                Ok(false) => Ok(Transfer::WouldBlock),
                Err(e) => Err(TransportError::Io(e)),
            },
            None => Ok(Transfer::Ready(0)),
        };
        observe("flush", fd, result)
    }

    fn buffer_size(&self) -> usize {
        BUFFER_SIZE
    }
}

fn observe(
    op: &'static str,
    fd: RawFd,
    result: Result<Transfer, TransportError>,
) -> Result<Transfer, TransportError> {
    match &result {
        Ok(Transfer::Ready(n)) => tracing::trace!(fd, op, bytes = n, "[tls] SSL {op}"),
        Ok(outcome) => tracing::trace!(fd, op, ?outcome, "[tls] SSL {op}"),
        Err(e) => {
            metrics::record_io_error(op);
            tracing::debug!(fd, op, error = %e, kind = e.kind(), "[tls] Call failed");
        }
    }
    result
}

/// Push queued TLS records. `Ok(false)` means the socket filled up first.
fn flush_records(conn: &mut ServerConnection, sock: &mut FdSocket) -> io::Result<bool> {
    while conn.wants_write() {
        match conn.write_tls(sock) {
            Ok(0) => return Ok(false),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Decrypt whatever the peer sent, answering the alert on failure.
fn process(conn: &mut ServerConnection, sock: &mut FdSocket) -> Result<(), TransportError> {
    if let Err(e) = conn.process_new_packets() {
        // Best effort: the alert rustls queued for the peer.
        let _ = flush_records(conn, sock);
        return Err(TransportError::Tls(e));
    }
    Ok(())
}

fn read_plaintext(
    conn: &mut ServerConnection,
    sock: &mut FdSocket,
    buf: &mut [u8],
) -> Result<Transfer, TransportError> {
    if buf.is_empty() {
        return Ok(Transfer::Ready(0));
    }
    loop {
        match conn.reader().read(buf) {
            Ok(0) => return Ok(Transfer::Eof),
            Ok(n) => return Ok(Transfer::Ready(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Transfer::Eof),
            Err(e) => return Err(TransportError::Io(e)),
        }

        match conn.read_tls(sock) {
            // End of stream is recorded by rustls; the reader reports it next round.
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                flush_records(conn, sock).map_err(TransportError::Io)?;
                return Ok(Transfer::WouldBlock);
            }
            Err(e) => return Err(TransportError::Io(e)),
        }
        process(conn, sock)?;
        flush_records(conn, sock).map_err(TransportError::Io)?;
    }
}

/// Drive a pending handshake as far as the socket allows.
/// `None` means the handshake is complete.
fn complete_handshake(
    conn: &mut ServerConnection,
    sock: &mut FdSocket,
) -> Result<Option<Transfer>, TransportError> {
    while conn.is_handshaking() {
        if !flush_records(conn, sock).map_err(TransportError::Io)? {
            return Ok(Some(Transfer::WouldBlock));
        }
        match conn.read_tls(sock) {
            Ok(0) => {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed during handshake",
                )))
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(Some(Transfer::WouldBlock))
            }
            Err(e) => return Err(TransportError::Io(e)),
        }
        process(conn, sock)?;
    }
    Ok(None)
}

fn write_plaintext(
    session: &mut TlsSession,
    sock: &mut FdSocket,
    data: &[u8],
) -> Result<Transfer, TransportError> {
    // Retry of a write whose records were left queued.
    if session.unflushed() > 0 {
        if !flush_records(session.connection_mut(), sock).map_err(TransportError::Io)? {
            return Ok(Transfer::WouldBlock);
        }
        return Ok(Transfer::Ready(session.take_unflushed()));
    }

    let conn = session.connection_mut();
    if let Some(blocked) = complete_handshake(conn, sock)? {
        return Ok(blocked);
    }

    let accepted = conn.writer().write(data).map_err(TransportError::Io)?;
    let drained = flush_records(conn, sock).map_err(TransportError::Io)?;
    if accepted == 0 && !data.is_empty() {
        return Ok(Transfer::WouldBlock);
    }
    if !drained {
        session.set_unflushed(accepted);
        return Ok(Transfer::WouldBlock);
    }
    Ok(Transfer::Ready(accepted))
}

enum Stop {
    /// End of file or `count` reached.
    Done,
    /// The encrypted write path took less than offered.
    Blocked,
    Failed(TransportError),
}

fn send_chunks(
    session: &mut TlsSession,
    sock: &mut FdSocket,
    scratch: &mut Vec<u8>,
    file: &File,
    offset: &mut u64,
    count: usize,
) -> Result<Transfer, TransportError> {
    scratch.clear();
    scratch.try_reserve_exact(BUFFER_SIZE)?;
    scratch.resize(BUFFER_SIZE, 0);

    let mut sent = 0usize;
    let stop = loop {
        let want = if count == 0 {
            BUFFER_SIZE
        } else {
            (count - sent).min(BUFFER_SIZE)
        };
        if want == 0 {
            break Stop::Done;
        }

        let read = match file.read_at(&mut scratch[..want], *offset) {
            Ok(0) => break Stop::Done,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "[tls] Read from file failed");
                break Stop::Failed(TransportError::FileRead(e));
            }
        };

        match write_plaintext(session, sock, &scratch[..read]) {
            Ok(Transfer::Ready(written)) => {
                sent += written;
                *offset += written as u64;
                if written < read {
                    break Stop::Blocked;
                }
            }
            Ok(Transfer::WouldBlock | Transfer::Eof) => break Stop::Blocked,
            Err(e) => break Stop::Failed(e),
        }
    };

    match (stop, sent) {
        (Stop::Failed(e), 0) => Err(e),
        (Stop::Failed(e), sent) => {
            tracing::debug!(sent, error = %e, "[tls] File send stopped early");
            Ok(Transfer::Ready(sent))
        }
        (Stop::Blocked, 0) => Ok(Transfer::WouldBlock),
        (Stop::Blocked | Stop::Done, sent) => Ok(Transfer::Ready(sent)),
    }
}
