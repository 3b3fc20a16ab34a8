use crate::{
    connection::Operation,
    error::{ExchangeError, ExchangeResult},
};
use log::debug;
use std::{future::Future, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time,
};

/// Read a chunk from a socket, and log it. A zero-byte read means the peer
/// closed its side, which is reported as [ExchangeError::SocketClose].
pub async fn socket_read(
    mut socket: impl AsyncReadExt + Unpin,
    buffer: &mut [u8],
) -> ExchangeResult<&[u8]> {
    let bytes_read = socket
        .read(buffer)
        .await
        .map_err(ExchangeError::Receive)?;
    if bytes_read == 0 {
        Err(ExchangeError::SocketClose)
    } else {
        let received = &buffer[0..bytes_read];
        debug!("<= {:?}", String::from_utf8_lossy(received));
        Ok(received)
    }
}

/// Write a whole message to a socket, and log it. Partial writes are retried
/// until every byte is out, so the returned count is always `bytes.len()`.
pub async fn socket_write(
    mut socket: impl AsyncWriteExt + Unpin,
    bytes: &[u8],
) -> ExchangeResult<usize> {
    debug!("=> {:?}", String::from_utf8_lossy(bytes));
    socket
        .write_all(bytes)
        .await
        .map_err(ExchangeError::Send)?;
    Ok(bytes.len())
}

/// Run a future under an optional deadline. `None` waits forever.
pub async fn with_timeout<T>(
    operation: Operation,
    timeout: Option<Duration>,
    future: impl Future<Output = ExchangeResult<T>>,
) -> ExchangeResult<T> {
    match timeout {
        Some(after) => time::timeout(after, future)
            .await
            .map_err(|_| ExchangeError::Timeout { operation, after })?,
        None => future.await,
    }
}

/// Decode bytes with a single-byte charset (ISO-8859-1). Every byte becomes
/// exactly one char, so chunk boundaries never split a character.
pub fn decode_single_byte(bytes: &[u8]) -> impl '_ + Iterator<Item = char> {
    bytes.iter().map(|&byte| char::from(byte))
}

/// Inverse of [decode_single_byte]. Chars outside the charset become `?`.
pub fn encode_single_byte(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
