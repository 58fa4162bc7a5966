//! TCP server for the printable-count protocol.
//!
//! Accepts one connection at a time and hands it to the connection handler
//! before accepting the next. The loop ends once shutdown is requested,
//! either while idle in `accept` or right after the active connection
//! finishes, and returns the histogram for reporting.

use crate::config::Config;
use crate::connection::{self, DropReason, Outcome};
use crate::error::ServerError;
use crate::histogram::Histogram;
use crate::shutdown::Shutdown;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Server instance
pub struct Server {
    listener: TcpListener,
    shutdown: Shutdown,
    histogram: Histogram,
}

impl Server {
    /// Bind and listen on the configured address.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &Config, shutdown: Shutdown) -> Result<Self, ServerError> {
        let addr = config.listen;
        let listener = create_listener(addr, config.backlog)
            .and_then(TcpListener::from_std)
            .map_err(|source| ServerError::Listen { addr, source })?;

        info!(address = %addr, backlog = config.backlog, "Server listening");

        Ok(Server {
            listener,
            shutdown,
            histogram: Histogram::new(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve clients until shutdown is requested.
    ///
    /// Returns the histogram of all connections that completed. An accept
    /// failure or a fatal connection error ends the loop with an error.
    pub async fn run(mut self) -> Result<Histogram, ServerError> {
        while !self.shutdown.is_stopping() {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.stopped() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = accepted.map_err(ServerError::Accept)?;

            let active = self.shutdown.begin_connection();
            debug!(%peer, "New connection");

            let outcome = connection::handle(stream, &mut self.histogram).await?;
            log_outcome(peer, &outcome);

            drop(active);
        }

        let stats = self.histogram.stats();
        info!(
            connections = stats.connections,
            distinct_chars = stats.distinct_chars,
            total_chars = stats.total_chars,
            "Server shutting down"
        );

        Ok(self.histogram)
    }
}

fn log_outcome(peer: SocketAddr, outcome: &Outcome) {
    match outcome {
        Outcome::Completed { count } => debug!(%peer, count, "Connection completed"),
        Outcome::EmptyPayload => debug!(%peer, "Empty payload, closing without result"),
        Outcome::Dropped {
            state,
            reason: DropReason::PeerClosed,
        } => warn!(%peer, ?state, "Client disconnected early"),
        Outcome::Dropped {
            state,
            reason: DropReason::PeerError(e),
        } => warn!(%peer, ?state, error = %e, "TCP error, dropping client"),
    }
}

/// Create a listening socket with SO_REUSEADDR and the given backlog.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
