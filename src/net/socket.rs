//! Raw-descriptor socket I/O.
//!
//! The host owns its sockets as bare descriptors, so the TLS session reads
//! and writes them through this thin wrapper instead of a std stream type.

use std::io::{self, Read, Write};
use std::os::fd::RawFd;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

fn cvt(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Borrowed view of a socket descriptor. Never closes it.
#[derive(Debug, Clone, Copy)]
pub struct FdSocket(RawFd);

impl FdSocket {
    pub fn new(fd: RawFd) -> Self {
        Self(fd)
    }
}

impl Read for FdSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is valid for `buf.len()` writable bytes.
            let ret = unsafe { libc::recv(self.0, buf.as_mut_ptr().cast(), buf.len(), 0) };
            match cvt(ret) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

impl Write for FdSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is valid for `buf.len()` readable bytes.
            let ret = unsafe { libc::send(self.0, buf.as_ptr().cast(), buf.len(), SEND_FLAGS) };
            match cvt(ret) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Close a descriptor the host handed over.
pub fn close_fd(fd: RawFd) -> io::Result<()> {
    // SAFETY: closing an arbitrary descriptor is memory-safe; a stale value
    // is reported as EBADF.
    if unsafe { libc::close(fd) } < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::{AsRawFd, IntoRawFd};
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_reads_and_writes_raw_fd() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut sock = FdSocket::new(a.as_raw_fd());

        assert_eq!(sock.write(b"ping").unwrap(), 4);
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        b.write_all(b"pong").unwrap();
        assert_eq!(sock.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn test_nonblocking_read_would_block() {
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut sock = FdSocket::new(a.as_raw_fd());
        let err = sock.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_close_fd() {
        let (a, mut b) = UnixStream::pair().unwrap();
        close_fd(a.into_raw_fd()).unwrap();
        // Peer sees end of stream once the only descriptor is closed.
        assert_eq!(b.read(&mut [0u8; 1]).unwrap(), 0);
        assert_eq!(close_fd(-1).unwrap_err().raw_os_error(), Some(libc::EBADF));
    }
}
