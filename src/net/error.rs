//! Per-call outcomes of the transport hooks.

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Successful outcome of a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// `n` bytes were delivered (read) or accepted (write).
    Ready(usize),
    /// Nothing could be done without blocking; retry on any readiness.
    WouldBlock,
    /// The peer ended the stream.
    Eof,
}

/// A fatal failure of one transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("socket I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("source file read failed: {0}")]
    FileRead(#[source] io::Error),

    #[error("scratch buffer allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    #[error("thread context retired by plugin exit")]
    Retired,
}

impl TransportError {
    /// Label used for the `tls_io_errors_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tls(_) => "tls",
            Self::Io(_) => "io",
            Self::FileRead(_) => "file_read",
            Self::Alloc(_) => "alloc",
            Self::Retired => "retired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_error_converts() {
        let err = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        let err = TransportError::from(err);
        assert_eq!(err.kind(), "alloc");
        assert!(err.to_string().starts_with("scratch buffer allocation failed"));
    }
}
