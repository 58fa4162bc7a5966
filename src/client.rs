//! Client side of the printable-count protocol.
//!
//! Sends the payload length, streams the payload, then reads back the
//! printable count. Used by the `pcc-client` binary and the integration
//! tests.

use crate::protocol::{decode_u32, encode_u32, FRAME_LEN};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Client errors. All of them are fatal for the client process.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to open '{}': {source}", .path.display())]
    File { path: PathBuf, source: io::Error },

    #[error("payload of {0} bytes does not fit in a 32-bit length")]
    PayloadTooLarge(u64),

    #[error("payload ended after {sent} of {declared} bytes")]
    ShortPayload { sent: u64, declared: u32 },

    #[error("server closed the connection without sending a result")]
    NoResult,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Send an in-memory payload and return the server's printable count.
pub async fn count_printable<A: ToSocketAddrs>(addr: A, payload: &[u8]) -> Result<u32, ClientError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| ClientError::PayloadTooLarge(payload.len() as u64))?;
    exchange(addr, len, payload).await
}

/// Send the contents of a file and return the server's printable count.
pub async fn send_file<A: ToSocketAddrs>(addr: A, path: &Path) -> Result<u32, ClientError> {
    let file_error = |source: io::Error| ClientError::File {
        path: path.to_path_buf(),
        source,
    };
    let file = tokio::fs::File::open(path).await.map_err(file_error)?;
    let size = file.metadata().await.map_err(file_error)?.len();
    let len = u32::try_from(size).map_err(|_| ClientError::PayloadTooLarge(size))?;

    exchange(addr, len, file).await
}

async fn exchange<A, R>(addr: A, len: u32, payload: R) -> Result<u32, ClientError>
where
    A: ToSocketAddrs,
    R: AsyncRead + Unpin,
{
    let mut stream = TcpStream::connect(addr).await?;
    debug!(peer = %stream.peer_addr()?, declared_len = len, "Connected");

    stream.write_all(&encode_u32(len)).await?;

    let mut payload = payload.take(u64::from(len));
    let sent = tokio::io::copy(&mut payload, &mut stream).await?;
    if sent < u64::from(len) {
        return Err(ClientError::ShortPayload { sent, declared: len });
    }

    let mut frame = [0u8; FRAME_LEN];
    match stream.read_exact(&mut frame).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(ClientError::NoResult),
        Err(e) => return Err(e.into()),
    }

    let count = decode_u32(frame);
    debug!(count, "Received printable count");
    Ok(count)
}
