//! Error types for the printable-count server.
//!
//! Only errors that end the process live here. Recoverable peer errors are
//! folded into a connection outcome by the handler and never surface as a
//! `ServerError`.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Fatal server errors. Any of these terminates the process with a failure
/// status and without printing the histogram report.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Interrupt handler could not be registered
    #[error("failed to register interrupt handler: {0}")]
    Signal(#[source] io::Error),

    /// Socket creation, bind, or listen failed
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listening socket failed to accept a connection
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// Connection I/O failed with an error that is not a TCP peer error
    #[error("connection I/O error: {0}")]
    ConnectionIo(#[source] io::Error),
}

/// Returns true for TCP errors that abort only the current connection:
/// peer reset, broken pipe, and timeout.
pub fn is_recoverable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::TimedOut,
        ] {
            assert!(is_recoverable(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[test]
    fn test_fatal_kinds() {
        for kind in [
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::Other,
        ] {
            assert!(!is_recoverable(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[test]
    fn test_listen_error_display() {
        let err = ServerError::Listen {
            addr: "127.0.0.1:7000".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to listen on 127.0.0.1:7000"));
    }
}
